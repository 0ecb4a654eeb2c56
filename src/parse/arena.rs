//! Struct-of-arrays storage for the parsed querystring.
//!
//! Every record refers to the input through a [`Span`] and to other records
//! through `u32` indices, so resetting the arena is a truncation of each
//! table and the backing capacity survives across parses.

use std::ops::Range;

use crate::error::{Error, Result};

/// A byte range of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub offset: u32,
    pub len: u32,
}

impl Span {
    #[inline]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Builds a span from byte positions, which must already have been
    /// checked to fit in `u32` (see [`Arena::reset`]).
    #[inline]
    pub(crate) fn from_range(start: usize, end: usize) -> Self {
        Self {
            offset: start as u32,
            len: (end - start) as u32,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn end(&self) -> u32 {
        self.offset + self.len
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..self.end() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// The leading identifier, before any bracket or dot.
    Root,
    /// `[name]` or `.name`.
    Ident,
    /// `[3]`: a canonical index within the array limit.
    Index,
    /// `[]`
    Empty,
    /// Key text kept verbatim: the whole key with `depth = 0`, or the
    /// remainder past the depth limit.
    Literal,
}

/// How a segment attached to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    Root,
    Bracket,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub notation: Notation,
    pub span: Span,
    /// The parsed index for `SegmentKind::Index`, `-1` otherwise.
    pub index: i64,
}

impl Segment {
    pub(crate) fn new(kind: SegmentKind, notation: Notation, span: Span) -> Self {
        Self {
            kind,
            notation,
            span,
            index: -1,
        }
    }

    pub(crate) fn index(notation: Notation, span: Span, index: i64) -> Self {
        debug_assert!(index >= 0);
        Self {
            kind: SegmentKind::Index,
            notation,
            span,
            index,
        }
    }

    /// The list index of an `Index` segment.
    pub fn list_index(&self) -> Option<usize> {
        match self.kind {
            SegmentKind::Index => usize::try_from(self.index).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub raw: Span,
    pub segments: Range<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Simple,
    /// An `=` followed by no text.
    Null,
    /// Two or more parts split on literal commas.
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValue {
    pub kind: ValueKind,
    pub raw: Span,
    pub parts: Range<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: Key,
    /// Index of the value record (see [`Arena::value`]); `None` when the
    /// parameter had no `=`.
    pub value: Option<u32>,
    pub has_equals: bool,
}

/// Root of the parsed querystring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryString {
    pub parameters: Range<u32>,
    pub has_query_prefix: bool,
}

/// Storage for one parse at a time.
///
/// ```
/// use nested_qs::parse::Arena;
///
/// let arena = Arena::new("a=1");
/// // reuse the tables for another input
/// let arena = arena.reset("b=2").unwrap();
/// assert_eq!(arena.source(), "b=2");
/// ```
#[derive(Debug, Default)]
pub struct Arena<'a> {
    source: &'a str,
    segments: Vec<Segment>,
    values: Vec<ParamValue>,
    value_parts: Vec<Span>,
    parameters: Vec<Parameter>,
    /// Delimited pieces of the input, before key/value splitting.
    pub(crate) pieces: Vec<Span>,
}

impl<'a> Arena<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_capacity(source, 0)
    }

    /// Preallocates the tables for about `expected_parameters` parameters.
    /// A capacity of 0 allocates nothing.
    pub fn with_capacity(source: &'a str, expected_parameters: usize) -> Self {
        Self {
            source,
            segments: Vec::with_capacity(expected_parameters * 2),
            values: Vec::with_capacity(expected_parameters),
            value_parts: Vec::new(),
            parameters: Vec::with_capacity(expected_parameters),
            pieces: Vec::with_capacity(expected_parameters),
        }
    }

    /// Rebinds the arena to a new input, clearing every table but keeping
    /// its capacity.
    pub fn reset<'b>(self, source: &'b str) -> Result<Arena<'b>> {
        if u32::try_from(source.len()).is_err() {
            return Err(Error::InputTooLarge { len: source.len() });
        }
        let mut arena = Arena {
            source,
            segments: self.segments,
            values: self.values,
            value_parts: self.value_parts,
            parameters: self.parameters,
            pieces: self.pieces,
        };
        arena.clear();
        Ok(arena)
    }

    fn clear(&mut self) {
        self.segments.clear();
        self.values.clear();
        self.value_parts.clear();
        self.parameters.clear();
        self.pieces.clear();
    }

    /// Drops the borrowed input so the tables can be stored for later use.
    pub(crate) fn detach(mut self) -> Arena<'static> {
        self.clear();
        Arena {
            source: "",
            segments: self.segments,
            values: self.values,
            value_parts: self.value_parts,
            parameters: self.parameters,
            pieces: self.pieces,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the raw text of a span.
    #[inline]
    pub fn get_string(&self, span: Span) -> &'a str {
        &self.source[span.range()]
    }

    pub fn push_segment(&mut self, segment: Segment) -> u32 {
        push(&mut self.segments, segment)
    }

    pub fn push_value(&mut self, value: ParamValue) -> u32 {
        push(&mut self.values, value)
    }

    pub fn push_value_part(&mut self, part: Span) -> u32 {
        push(&mut self.value_parts, part)
    }

    pub fn push_parameter(&mut self, parameter: Parameter) -> u32 {
        push(&mut self.parameters, parameter)
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn value_part_count(&self) -> u32 {
        self.value_parts.len() as u32
    }

    pub fn parameter_count(&self) -> u32 {
        self.parameters.len() as u32
    }

    pub fn segments(&self, key: &Key) -> &[Segment] {
        &self.segments[key.segments.start as usize..key.segments.end as usize]
    }

    pub fn value(&self, id: u32) -> &ParamValue {
        &self.values[id as usize]
    }

    pub fn value_parts(&self, value: &ParamValue) -> &[Span] {
        &self.value_parts[value.parts.start as usize..value.parts.end as usize]
    }

    pub fn parameters(&self, query: &QueryString) -> &[Parameter] {
        &self.parameters[query.parameters.start as usize..query.parameters.end as usize]
    }
}

#[inline]
fn push<T>(table: &mut Vec<T>, item: T) -> u32 {
    let id = table.len() as u32;
    table.push(item);
    id
}
