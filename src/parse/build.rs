//! Tree construction: walks the parameters recorded in an [`Arena`] and
//! merges each one into a nested [`Value`].
//!
//! Containers are created lazily while walking a key path. The kind of the
//! segment that follows decides whether a container must be a list or a
//! map, and a container of the wrong kind is converted in place rather than
//! replaced, so `a[0]=x&a[b]=y` gives `{ a: { 0: x, b: y } }`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::mem;

use smallvec::SmallVec;

use crate::config::{Charset, Config, Duplicates};
use crate::error::{Error, Result};
use crate::map::Map;
use crate::value::Value;

use super::arena::{Arena, Parameter, QueryString, SegmentKind, Span, ValueKind};
use super::decode::{DecodeKind, decode_with, interpret_numeric_entities};

/// Names that would shadow `Object.prototype` members in JavaScript.
const PROTOTYPE_KEYS: &[&str] = &[
    "constructor",
    "prototype",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toLocaleString",
    "toString",
    "valueOf",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

/// Most list holes one build may create. Past it, an index that would open a
/// gap turns its list into a map instead.
const HOLE_BUDGET: usize = 1 << 16;

fn is_denied(name: &str, allow_prototypes: bool) -> bool {
    name == "__proto__" || (!allow_prototypes && PROTOTYPE_KEYS.contains(&name))
}

/// The tree under construction. `Hole` marks a list slot (or a freshly
/// created map entry) that has not been written yet.
#[derive(Debug)]
enum Node {
    Map(Map<String, Node>),
    List(Vec<Node>),
    String(String),
    Bool(bool),
    Null,
    Hole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Hole,
    Container,
    Primitive,
}

impl Node {
    fn shape(&self) -> Shape {
        match self {
            Node::Hole => Shape::Hole,
            Node::Map(_) | Node::List(_) => Shape::Container,
            Node::String(_) | Node::Bool(_) | Node::Null => Shape::Primitive,
        }
    }

    fn is_container(&self) -> bool {
        self.shape() == Shape::Container
    }

    fn is_empty_leaf(&self) -> bool {
        match self {
            Node::Null => true,
            Node::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

/// One decoded component of a key path.
#[derive(Debug, Clone, Copy)]
enum Step<'s> {
    Name(&'s str),
    Index(usize),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want {
    Map,
    List,
}

fn want_for(next: Step<'_>, parse_arrays: bool) -> Want {
    match next {
        Step::Index(_) => Want::List,
        Step::Empty if parse_arrays => Want::List,
        _ => Want::Map,
    }
}

/// Builds nested values from tokenized querystrings.
///
/// The builder caches decoded key segments by span. The cache is cleared at
/// the start of every [`build`](Builder::build), so one builder can be
/// reused for any number of sequential parses.
#[derive(Debug, Default)]
pub struct Builder {
    keys: HashMap<Span, String>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &mut self,
        arena: &Arena<'_>,
        query: &QueryString,
        charset: Charset,
        config: &Config,
    ) -> Result<Value> {
        self.keys.clear();
        let mut root = Node::Map(Map::new());
        let mut holes = HOLE_BUDGET;

        for parameter in arena.parameters(query) {
            if parameter.key.raw.is_empty() {
                continue;
            }
            self.decode_keys(arena, parameter, charset, config)?;
            let Some(steps) = self.steps(arena, parameter, config) else {
                tracing::debug!(
                    key = arena.get_string(parameter.key.raw),
                    "dropping parameter with a denied key"
                );
                continue;
            };
            let leaf = leaf(arena, parameter, charset, config)?;
            insert(&mut root, &steps, leaf, &mut holes, config);
        }

        Ok(finish(root, config.allow_sparse))
    }

    /// Decodes the named segments of a key into the cache. Segments whose
    /// text needs no decoding are read straight from the input later.
    fn decode_keys(
        &mut self,
        arena: &Arena<'_>,
        parameter: &Parameter,
        charset: Charset,
        config: &Config,
    ) -> Result<()> {
        for segment in arena.segments(&parameter.key) {
            if matches!(segment.kind, SegmentKind::Empty | SegmentKind::Index)
                || self.keys.contains_key(&segment.span)
            {
                continue;
            }
            let raw = arena.get_string(segment.span);
            let decoded = match &config.decoder {
                Some(decoder) => Cow::Owned(
                    decoder
                        .decode(raw, charset, DecodeKind::Key)
                        .map_err(Error::decoder)?,
                ),
                None => decode_with(
                    raw,
                    charset,
                    config.percent_decoding,
                    segment.span.offset as usize,
                )?,
            };
            // a double-encoded `%252E` is a literal dot in the name
            let decoded = if config.decode_dot_in_keys
                && (decoded.contains("%2E") || decoded.contains("%2e"))
            {
                Cow::Owned(decoded.replace("%2E", ".").replace("%2e", "."))
            } else {
                decoded
            };
            if let Cow::Owned(text) = decoded {
                self.keys.insert(segment.span, text);
            }
        }
        Ok(())
    }

    fn key_text<'s>(&'s self, arena: &'s Arena<'_>, span: Span) -> &'s str {
        match self.keys.get(&span) {
            Some(text) => text,
            None => arena.get_string(span),
        }
    }

    /// Returns `None` if any name on the path is denied.
    fn steps<'s>(
        &'s self,
        arena: &'s Arena<'_>,
        parameter: &Parameter,
        config: &Config,
    ) -> Option<SmallVec<[Step<'s>; 8]>> {
        let mut steps = SmallVec::new();
        for segment in arena.segments(&parameter.key) {
            let step = match (segment.kind, segment.list_index()) {
                (SegmentKind::Empty, _) => Step::Empty,
                (SegmentKind::Index, Some(index)) => Step::Index(index),
                _ => {
                    let name = self.key_text(arena, segment.span);
                    if is_denied(name, config.allow_prototypes) {
                        return None;
                    }
                    Step::Name(name)
                }
            };
            steps.push(step);
        }
        Some(steps)
    }
}

/// Builds a value with a fresh [`Builder`].
pub fn build(
    arena: &Arena<'_>,
    query: &QueryString,
    charset: Charset,
    config: &Config,
) -> Result<Value> {
    Builder::new().build(arena, query, charset, config)
}

fn leaf(
    arena: &Arena<'_>,
    parameter: &Parameter,
    charset: Charset,
    config: &Config,
) -> Result<Node> {
    let Some(id) = parameter.value else {
        return Ok(if config.strict_null_handling {
            Node::Null
        } else {
            Node::String(String::new())
        });
    };
    let value = arena.value(id);
    match value.kind {
        ValueKind::Comma => arena
            .value_parts(value)
            .iter()
            .map(|&part| decode_value(arena, part, charset, config).map(Node::String))
            .collect::<Result<Vec<_>>>()
            .map(Node::List),
        ValueKind::Simple | ValueKind::Null => {
            decode_value(arena, value.raw, charset, config).map(Node::String)
        }
    }
}

fn decode_value(
    arena: &Arena<'_>,
    span: Span,
    charset: Charset,
    config: &Config,
) -> Result<String> {
    let raw = arena.get_string(span);
    let decoded = match &config.decoder {
        Some(decoder) => decoder
            .decode(raw, charset, DecodeKind::Value)
            .map_err(Error::decoder)?,
        None => {
            decode_with(raw, charset, config.percent_decoding, span.offset as usize)?.into_owned()
        }
    };
    if config.interpret_numeric_entities && charset == Charset::Latin1 {
        if let Cow::Owned(text) = interpret_numeric_entities(&decoded) {
            return Ok(text);
        }
    }
    Ok(decoded)
}

fn insert(
    root: &mut Node,
    steps: &[Step<'_>],
    leaf: Node,
    holes: &mut usize,
    config: &Config,
) {
    let Some((last, path)) = steps.split_last() else {
        return;
    };
    let mut node = root;
    let mut append = false;
    for (i, &step) in path.iter().enumerate() {
        let want = want_for(steps[i + 1], config.parse_arrays);
        let slot = child(node, step, append, holes);
        (node, append) = descend(slot, want);
    }
    insert_terminal(node, *last, append, leaf, holes, config);
}

/// Charges the holes that indexing a list with `step` would create against
/// `holes`. Returns false, charging nothing, if they do not fit.
fn reserve_holes(node: &Node, step: Step<'_>, append: bool, holes: &mut usize) -> bool {
    let (Node::List(list), Step::Index(index), false) = (node, step, append) else {
        return true;
    };
    let gap = index.saturating_sub(list.len());
    if gap > *holes {
        return false;
    }
    *holes -= gap;
    true
}

/// Returns the slot `step` names inside the container `node`, creating it
/// as a hole if needed. `append` forces a new list slot.
fn child<'n>(
    node: &'n mut Node,
    step: Step<'_>,
    append: bool,
    holes: &mut usize,
) -> &'n mut Node {
    if matches!(step, Step::Name(_)) || !reserve_holes(node, step, append, holes) {
        list_to_map(node);
    }
    match node {
        Node::List(list) => list_slot(list, step, append),
        other => map_slot(expect_map(other), step),
    }
}

fn list_slot<'n>(list: &'n mut Vec<Node>, step: Step<'_>, append: bool) -> &'n mut Node {
    let index = match step {
        _ if append => list.len(),
        Step::Index(index) => index,
        // `[]` continues into the first element
        _ => 0,
    };
    let index = if index >= list.len() {
        list.resize_with(index + 1, || Node::Hole);
        index
    } else if list[index].shape() == Shape::Primitive {
        // a primitive cannot hold children; they go into a new element
        list.push(Node::Hole);
        list.len() - 1
    } else {
        index
    };
    &mut list[index]
}

fn map_slot<'n>(map: &'n mut Map<String, Node>, step: Step<'_>) -> &'n mut Node {
    let mut buffer = itoa::Buffer::new();
    let key = match step {
        Step::Name(name) => name,
        Step::Index(index) => buffer.format(index),
        Step::Empty => "0",
    };
    map.entry(key.to_owned()).or_insert(Node::Hole)
}

/// Makes `slot` a container of the wanted kind and returns it, along with
/// whether the next step must append instead of indexing.
fn descend(slot: &mut Node, want: Want) -> (&mut Node, bool) {
    match slot.shape() {
        Shape::Hole => {
            *slot = match want {
                Want::Map => Node::Map(Map::new()),
                Want::List => Node::List(Vec::new()),
            };
            (slot, false)
        }
        Shape::Container => {
            if want == Want::Map {
                list_to_map(slot);
            }
            (slot, false)
        }
        Shape::Primitive => {
            let existing = mem::replace(slot, Node::Hole);
            match want {
                Want::List => {
                    *slot = Node::List(vec![existing]);
                    (slot, true)
                }
                Want::Map => {
                    *slot = Node::List(vec![existing, Node::Map(Map::new())]);
                    match slot {
                        Node::List(list) => (&mut list[1], false),
                        _ => unreachable!(),
                    }
                }
            }
        }
    }
}

fn insert_terminal(
    node: &mut Node,
    step: Step<'_>,
    append: bool,
    leaf: Node,
    holes: &mut usize,
    config: &Config,
) {
    if matches!(step, Step::Name(_)) || !reserve_holes(node, step, append, holes) {
        list_to_map(node);
    }
    let skip_empty = config.allow_empty_arrays && leaf.is_empty_leaf();
    match node {
        Node::List(list) => match step {
            Step::Index(index) if !append => {
                if index >= list.len() {
                    list.resize_with(index + 1, || Node::Hole);
                }
                assign(&mut list[index], leaf, config);
            }
            _ => {
                if !skip_empty {
                    list.push(leaf);
                }
            }
        },
        other => {
            // `[]=` directly under a map stays empty rather than becoming key "0"
            if skip_empty && config.parse_arrays && matches!(step, Step::Empty) {
                return;
            }
            assign(map_slot(expect_map(other), step), leaf, config);
        }
    }
}

/// Writes a leaf into a slot that may already hold a value.
fn assign(slot: &mut Node, leaf: Node, config: &Config) {
    match slot.shape() {
        Shape::Hole => *slot = leaf,
        Shape::Container => merge(slot, leaf, config.allow_prototypes),
        Shape::Primitive => match config.duplicates {
            Duplicates::Combine => combine(slot, leaf),
            Duplicates::First => {}
            Duplicates::Last => *slot = leaf,
        },
    }
}

fn merge(target: &mut Node, incoming: Node, allow_prototypes: bool) {
    if let (Node::List(_), Node::Map(_)) = (&*target, &incoming) {
        list_to_map(target);
    }
    match target {
        Node::Map(map) => merge_into_map(map, incoming, allow_prototypes),
        Node::List(list) => match incoming {
            Node::List(items) => merge_lists(list, items, allow_prototypes),
            Node::String(_) | Node::Bool(_) | Node::Null => list.push(incoming),
            Node::Map(_) | Node::Hole => {}
        },
        other => combine(other, incoming),
    }
}

fn merge_into_map(map: &mut Map<String, Node>, incoming: Node, allow_prototypes: bool) {
    match incoming {
        Node::String(key) => {
            if !key.is_empty() && !is_denied(&key, allow_prototypes) {
                map.insert(key, Node::Bool(true));
            }
        }
        Node::List(items) => {
            let mut buffer = itoa::Buffer::new();
            for (index, item) in items.into_iter().enumerate() {
                if item.shape() != Shape::Hole {
                    merge_entry(map, buffer.format(index), item, allow_prototypes);
                }
            }
        }
        Node::Map(entries) => {
            for (key, item) in entries {
                merge_entry(map, &key, item, allow_prototypes);
            }
        }
        Node::Bool(_) | Node::Null | Node::Hole => {}
    }
}

fn merge_entry(map: &mut Map<String, Node>, key: &str, item: Node, allow_prototypes: bool) {
    match map.get_mut(key) {
        Some(existing) => merge(existing, item, allow_prototypes),
        None => {
            map.insert(key.to_owned(), item);
        }
    }
}

/// Merges element-wise: a free slot takes the item, two containers merge,
/// and anything else appends.
fn merge_lists(list: &mut Vec<Node>, items: Vec<Node>, allow_prototypes: bool) {
    for (index, item) in items.into_iter().enumerate() {
        if item.shape() == Shape::Hole {
            continue;
        }
        match list.get_mut(index) {
            None => {
                list.resize_with(index, || Node::Hole);
                list.push(item);
            }
            Some(slot) if slot.shape() == Shape::Hole => *slot = item,
            Some(slot) if slot.is_container() && item.is_container() => {
                merge(slot, item, allow_prototypes)
            }
            Some(_) => list.push(item),
        }
    }
}

/// `[existing, incoming...]`
fn combine(target: &mut Node, incoming: Node) {
    let existing = mem::replace(target, Node::Hole);
    if existing.shape() == Shape::Hole {
        *target = incoming;
        return;
    }
    let mut list = vec![existing];
    match incoming {
        Node::List(items) => list.extend(items),
        Node::Hole => {}
        other => list.push(other),
    }
    *target = Node::List(list);
}

/// Re-keys a list as a map of stringified indices. Holes are dropped.
fn list_to_map(node: &mut Node) {
    if let Node::List(list) = node {
        let list = mem::take(list);
        let mut buffer = itoa::Buffer::new();
        let map = list
            .into_iter()
            .enumerate()
            .filter(|(_, item)| item.shape() != Shape::Hole)
            .map(|(index, item)| (buffer.format(index).to_owned(), item))
            .collect();
        *node = Node::Map(map);
    }
}

fn expect_map(node: &mut Node) -> &mut Map<String, Node> {
    match node {
        Node::Map(map) => map,
        _ => unreachable!("the walk only enters containers"),
    }
}

enum Partial {
    Map(Map<String, Value>),
    List(Vec<Value>),
}

impl Partial {
    fn push(&mut self, key: Option<String>, value: Value) {
        match self {
            Partial::Map(map) => {
                map.insert(key.unwrap_or_default(), value);
            }
            Partial::List(list) => list.push(value),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Partial::Map(map) => Value::Map(map),
            Partial::List(list) => Value::List(list),
        }
    }
}

enum Children {
    Map(<Map<String, Node> as IntoIterator>::IntoIter),
    List(std::vec::IntoIter<Node>),
}

impl Iterator for Children {
    type Item = (Option<String>, Node);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Children::Map(entries) => entries.next().map(|(key, node)| (Some(key), node)),
            Children::List(items) => items.next().map(|node| (None, node)),
        }
    }
}

struct Frame {
    partial: Partial,
    children: Children,
    /// Key of this container in its parent map.
    key: Option<String>,
}

/// Converts the finished tree into a [`Value`], compacting list holes
/// unless `allow_sparse` is set. The walk is iterative.
fn finish(root: Node, allow_sparse: bool) -> Value {
    let mut stack: Vec<Frame> = Vec::new();
    let mut pending = Some((None, root));

    loop {
        let (key, value) = match pending.take() {
            Some((key, Node::Map(map))) => {
                stack.push(Frame {
                    partial: Partial::Map(Map::new()),
                    children: Children::Map(map.into_iter()),
                    key,
                });
                continue;
            }
            Some((key, Node::List(list))) => {
                stack.push(Frame {
                    partial: Partial::List(Vec::with_capacity(list.len())),
                    children: Children::List(list.into_iter()),
                    key,
                });
                continue;
            }
            Some((key, leaf)) => {
                let value = match leaf {
                    Node::String(s) => Value::String(s),
                    Node::Bool(b) => Value::Bool(b),
                    Node::Hole if !allow_sparse => continue,
                    _ => Value::Null,
                };
                (key, value)
            }
            None => {
                let Some(frame) = stack.last_mut() else {
                    return Value::Null;
                };
                if let Some(child) = frame.children.next() {
                    pending = Some(child);
                    continue;
                }
                let Some(frame) = stack.pop() else {
                    return Value::Null;
                };
                (frame.key, frame.partial.into_value())
            }
        };

        match stack.last_mut() {
            Some(parent) => parent.partial.push(key, value),
            None => return value,
        }
    }
}
