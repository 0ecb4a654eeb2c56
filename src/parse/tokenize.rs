use memchr::{memchr, memchr_iter, memmem};

use crate::config::{Charset, Config, Delimiter};
use crate::error::{Error, Result};

use super::arena::{Arena, Key, ParamValue, Parameter, QueryString, Span, ValueKind};
use super::decode::split_literal_comma;
use super::key_path::parse_key;

/// `utf8=✓`, percent-encoded as UTF-8.
pub const UTF8_SENTINEL: &str = "utf8=%E2%9C%93";
/// `utf8=&#10003;`, what browsers send for `✓` from an ISO-8859-1 form.
pub const LATIN1_SENTINEL: &str = "utf8=%26%2310003%3B";

/// Splits the arena's source into parameters.
///
/// Fills the arena tables and returns the parsed querystring together with
/// the charset to decode it with, which a sentinel parameter may override.
pub fn tokenize(arena: &mut Arena<'_>, config: &Config) -> Result<(QueryString, Charset)> {
    let source = arena.source();
    if u32::try_from(source.len()).is_err() {
        return Err(Error::InputTooLarge { len: source.len() });
    }

    let has_query_prefix = source.starts_with('?');
    let start = usize::from(config.ignore_query_prefix && has_query_prefix);

    let limit = (config.parameter_limit != 0).then_some(config.parameter_limit);
    // one piece past the limit is enough to know it was crossed, plus one
    // for a sentinel that will be skipped
    let max_pieces = limit.map_or(usize::MAX, |limit| {
        limit
            .saturating_add(1)
            .saturating_add(usize::from(config.charset_sentinel))
    });

    let mut pieces = std::mem::take(&mut arena.pieces);
    pieces.clear();
    split_pieces(source, start, &config.delimiter, max_pieces, &mut pieces);

    let mut charset = config.charset;
    let mut skip = None;
    if config.charset_sentinel {
        let sentinel = pieces
            .iter()
            .position(|&piece| arena.get_string(piece).starts_with("utf8="));
        if let Some(pos) = sentinel {
            let detected = match arena.get_string(pieces[pos]) {
                UTF8_SENTINEL => Some(Charset::Utf8),
                LATIN1_SENTINEL => Some(Charset::Latin1),
                _ => None,
            };
            if let Some(detected) = detected {
                tracing::trace!(charset = ?detected, "charset sentinel found");
                charset = detected;
                skip = Some(pos);
            }
        }
    }

    let accepted = pieces.len() - usize::from(skip.is_some());
    let mut take = accepted;
    if let Some(limit) = limit {
        if accepted > limit {
            if config.throw_on_limit_exceeded {
                arena.pieces = pieces;
                return Err(Error::ParameterLimitExceeded { limit });
            }
            tracing::debug!(limit, "parameter limit reached, ignoring the rest of the input");
            take = limit;
        }
    }

    let first = arena.parameter_count();
    let result = pieces
        .iter()
        .enumerate()
        .filter(|&(i, _)| Some(i) != skip)
        .take(take)
        .try_for_each(|(_, &piece)| push_parameter(arena, piece, config));
    arena.pieces = pieces;
    result?;

    let query = QueryString {
        parameters: first..arena.parameter_count(),
        has_query_prefix,
    };
    Ok((query, charset))
}

/// Collects the non-empty pieces between delimiters, stopping once `max`
/// pieces have been found.
fn split_pieces(
    source: &str,
    start: usize,
    delimiter: &Delimiter,
    max: usize,
    out: &mut Vec<Span>,
) {
    let text = &source[start..];
    match delimiter {
        Delimiter::Char(c) if c.is_ascii() => {
            let matches = memchr_iter(*c as u8, text.as_bytes()).map(|idx| (idx, idx + 1));
            collect_pieces(matches, text.len(), start, max, out);
        }
        Delimiter::Char(c) => {
            let len = c.len_utf8();
            let matches = text.match_indices(*c).map(|(idx, _)| (idx, idx + len));
            collect_pieces(matches, text.len(), start, max, out);
        }
        Delimiter::Pattern(re) => {
            let matches = re.find_iter(text).map(|m| (m.start(), m.end()));
            collect_pieces(matches, text.len(), start, max, out);
        }
    }
}

fn collect_pieces<I>(delimiters: I, len: usize, base: usize, max: usize, out: &mut Vec<Span>)
where
    I: Iterator<Item = (usize, usize)>,
{
    let mut cursor = 0;
    for (delim_start, delim_end) in delimiters {
        if out.len() >= max {
            return;
        }
        if delim_start > cursor {
            out.push(Span::from_range(base + cursor, base + delim_start));
        }
        cursor = cursor.max(delim_end);
    }
    if out.len() < max && len > cursor {
        out.push(Span::from_range(base + cursor, base + len));
    }
}

/// Position of the `=` separating key and value. A `]=` wins over an
/// earlier `=` so that brackets may contain `=`.
fn equals_position(piece: &[u8]) -> Option<usize> {
    match memmem::find(piece, b"]=") {
        Some(pos) => Some(pos + 1),
        None => memchr(b'=', piece),
    }
}

fn push_parameter(arena: &mut Arena<'_>, piece: Span, config: &Config) -> Result<()> {
    let bytes = arena.get_string(piece).as_bytes();
    let (key_span, value_span) = match equals_position(bytes) {
        Some(pos) => {
            let eq = piece.offset as usize + pos;
            (
                Span::from_range(piece.offset as usize, eq),
                Some(Span::from_range(eq + 1, piece.end() as usize)),
            )
        }
        None => (piece, None),
    };

    let segments = parse_key(arena, key_span, config)?;

    let value = value_span.map(|raw| {
        let parts_start = arena.value_part_count();
        let kind = if raw.is_empty() {
            ValueKind::Null
        } else if config.comma {
            let source = arena.source();
            match split_literal_comma(source, raw) {
                Some(parts) => {
                    for part in parts {
                        arena.push_value_part(part);
                    }
                    ValueKind::Comma
                }
                None => ValueKind::Simple,
            }
        } else {
            ValueKind::Simple
        };
        arena.push_value(ParamValue {
            kind,
            raw,
            parts: parts_start..arena.value_part_count(),
        })
    });

    arena.push_parameter(Parameter {
        key: Key {
            raw: key_span,
            segments,
        },
        value,
        has_equals: value_span.is_some(),
    });
    Ok(())
}
