//! Decomposes a raw key such as `a[b][0]` or `a.b` into segments.
//!
//! The key is scanned once, left to right, by a two-state machine. Segment
//! text is recorded as spans of the raw key and only decoded later by the
//! builder, so an escaped `%5B` inside a segment name survives as `[`.

use std::ops::Range;

use crate::config::Config;
use crate::error::{Error, Result};

use super::arena::{Arena, Notation, Segment, SegmentKind, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Dot,
}

/// `pending` is the notation of the segment accumulated since `start`. It is
/// `None` right after a `]`, where stray text is skipped until the next
/// opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ident {
        pending: Option<Notation>,
        start: usize,
    },
    /// A bracket opened at `open`. The pending segment is only flushed once
    /// the bracket closes; an unclosed bracket becomes part of its text.
    Bracket {
        pending: Option<Notation>,
        start: usize,
        open: usize,
        content: usize,
    },
}

struct KeyScanner<'k> {
    key: &'k [u8],
    base: usize,
    dots: bool,
    encoded_dots: bool,
}

impl KeyScanner<'_> {
    /// Recognizes a structural token at `idx`, returning it with its length.
    /// Brackets may be percent-encoded; dots only with `decode_dot_in_keys`.
    fn token_at(&self, idx: usize) -> Option<(Token, usize)> {
        let key = self.key;
        match key[idx] {
            b'[' => Some((Token::Open, 1)),
            b']' => Some((Token::Close, 1)),
            b'.' if self.dots => Some((Token::Dot, 1)),
            b'%' if idx + 2 < key.len() => {
                match (key[idx + 1], key[idx + 2].to_ascii_uppercase()) {
                    (b'5', b'B') => Some((Token::Open, 3)),
                    (b'5', b'D') => Some((Token::Close, 3)),
                    (b'2', b'E') if self.encoded_dots => Some((Token::Dot, 3)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// A dot only separates segments when a name follows it: `a..b`, `a.`
    /// and `a.[b]` keep the dot as text.
    fn dot_separates(&self, after: usize) -> bool {
        after < self.key.len()
            && !matches!(self.token_at(after), Some((Token::Dot | Token::Open, _)))
    }

    fn has_close_after(&self, mut idx: usize) -> bool {
        while idx < self.key.len() {
            match self.token_at(idx) {
                Some((Token::Close, _)) => return true,
                Some((_, len)) => idx += len,
                None => idx += 1,
            }
        }
        false
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::from_range(self.base + start, self.base + end)
    }
}

/// Returns the index a bracket or dot segment names, if it is a canonical
/// non-negative integer no larger than `array_limit` that fits an `i64`.
fn canonical_index(text: &[u8], config: &Config) -> Option<i64> {
    if !config.parse_arrays || text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if text.len() > 1 && text[0] == b'0' {
        return None;
    }
    std::str::from_utf8(text)
        .ok()?
        .parse::<usize>()
        .ok()
        .filter(|&index| index <= config.array_limit)
        .and_then(|index| i64::try_from(index).ok())
}

/// Appends segments to the arena, keeping the first one at `Notation::Root`.
struct Emitter<'r, 'a> {
    arena: &'r mut Arena<'a>,
    first: u32,
    config: &'r Config,
}

impl Emitter<'_, '_> {
    fn notation(&self, notation: Notation) -> Notation {
        if self.arena.segment_count() == self.first {
            Notation::Root
        } else {
            notation
        }
    }

    fn classify(
        &self,
        scanner: &KeyScanner<'_>,
        notation: Notation,
        start: usize,
        end: usize,
    ) -> Segment {
        let span = scanner.span(start, end);
        // the first segment lands in the root map, so it is never an index
        if notation == Notation::Root {
            return Segment::new(SegmentKind::Ident, notation, span);
        }
        match canonical_index(&scanner.key[start..end], self.config) {
            Some(index) => Segment::index(notation, span, index),
            None => Segment::new(SegmentKind::Ident, notation, span),
        }
    }

    /// Flushes the root or dot segment spanning `start..end`.
    fn named(
        &mut self,
        scanner: &KeyScanner<'_>,
        notation: Notation,
        start: usize,
        end: usize,
    ) {
        let segment = match notation {
            // a key starting with `[` has no root text
            Notation::Root if start == end => return,
            Notation::Root => {
                Segment::new(SegmentKind::Root, Notation::Root, scanner.span(start, end))
            }
            _ => {
                let notation = self.notation(notation);
                self.classify(scanner, notation, start, end)
            }
        };
        self.arena.push_segment(segment);
    }

    fn bracket(&mut self, scanner: &KeyScanner<'_>, content: usize, end: usize) {
        let notation = self.notation(Notation::Bracket);
        let segment = if content == end {
            Segment::new(SegmentKind::Empty, notation, scanner.span(content, end))
        } else {
            self.classify(scanner, notation, content, end)
        };
        self.arena.push_segment(segment);
    }

    /// Keeps the rest of the key, from the opener at `idx`, as one literal.
    fn overflow(
        &mut self,
        scanner: &KeyScanner<'_>,
        notation: Notation,
        idx: usize,
    ) -> Result<()> {
        if self.config.strict_depth {
            return Err(Error::DepthLimitExceeded {
                depth: self.config.depth,
            });
        }
        tracing::trace!(depth = self.config.depth, "key exceeds depth, keeping remainder literal");
        let notation = self.notation(notation);
        let span = scanner.span(idx, scanner.key.len());
        self.arena
            .push_segment(Segment::new(SegmentKind::Literal, notation, span));
        Ok(())
    }

    fn range(&self) -> Range<u32> {
        self.first..self.arena.segment_count()
    }
}

/// Parses the key at `raw` into segments appended to the arena and returns
/// their range.
pub(crate) fn parse_key(arena: &mut Arena<'_>, raw: Span, config: &Config) -> Result<Range<u32>> {
    let first = arena.segment_count();
    let key = arena.get_string(raw).as_bytes();

    if config.depth == 0 || key.is_empty() {
        arena.push_segment(Segment::new(SegmentKind::Literal, Notation::Root, raw));
        return Ok(first..arena.segment_count());
    }

    let scanner = KeyScanner {
        key,
        base: raw.offset as usize,
        dots: config.allow_dots,
        encoded_dots: config.allow_dots && config.decode_dot_in_keys,
    };
    let mut emitter = Emitter {
        arena,
        first,
        config,
    };

    let mut state = State::Ident {
        pending: Some(Notation::Root),
        start: 0,
    };
    let mut depth = 0;
    let mut idx = 0;

    while idx < key.len() {
        let token = scanner.token_at(idx);
        match state {
            State::Ident { pending, start } => match token {
                Some((Token::Open, len)) => {
                    if depth == config.depth && scanner.has_close_after(idx + len) {
                        if let Some(notation) = pending {
                            emitter.named(&scanner, notation, start, idx);
                        }
                        emitter.overflow(&scanner, Notation::Bracket, idx)?;
                        return Ok(emitter.range());
                    }
                    depth += 1;
                    state = State::Bracket {
                        pending,
                        start,
                        open: idx,
                        content: idx + len,
                    };
                    idx += len;
                }
                Some((Token::Dot, len)) if scanner.dot_separates(idx + len) => {
                    if let Some(notation) = pending {
                        emitter.named(&scanner, notation, start, idx);
                    }
                    if depth == config.depth {
                        emitter.overflow(&scanner, Notation::Dot, idx)?;
                        return Ok(emitter.range());
                    }
                    depth += 1;
                    state = State::Ident {
                        pending: Some(Notation::Dot),
                        start: idx + len,
                    };
                    idx += len;
                }
                Some((_, len)) => idx += len,
                None => idx += 1,
            },
            State::Bracket {
                pending,
                start,
                open,
                content,
            } => match token {
                Some((Token::Close, len)) => {
                    if let Some(notation) = pending {
                        emitter.named(&scanner, notation, start, open);
                    }
                    emitter.bracket(&scanner, content, idx);
                    state = State::Ident {
                        pending: None,
                        start: idx + len,
                    };
                    idx += len;
                }
                // a nested `[` is plain text
                Some((_, len)) => idx += len,
                None => idx += 1,
            },
        }
    }

    let end = key.len();
    match state {
        State::Ident {
            pending: Some(notation),
            start,
        } => emitter.named(&scanner, notation, start, end),
        State::Ident { pending: None, .. } => {}
        // unclosed: the bracket and what follows is text of the pending
        // segment, or a segment of its own after a `]`
        State::Bracket {
            pending: Some(notation),
            start,
            ..
        } => emitter.named(&scanner, notation, start, end),
        State::Bracket {
            pending: None, open, ..
        } => {
            let notation = emitter.notation(Notation::Bracket);
            let span = scanner.span(open, end);
            emitter
                .arena
                .push_segment(Segment::new(SegmentKind::Ident, notation, span));
        }
    }

    Ok(emitter.range())
}
