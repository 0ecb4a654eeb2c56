use std::borrow::Cow;

use memchr::{memchr, memchr_iter, memchr2};
use percent_encoding::percent_decode;

use crate::config::{Charset, PercentDecoding};
use crate::error::{BoxError, Error, Result};

use super::arena::Span;

/// Whether a decoder is looking at a key or a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeKind {
    Key,
    Value,
}

/// A replacement for the default percent-decoder.
///
/// Custom decoders receive the raw text of each key segment and value and
/// may call [`decode_component`] to fall back to the default behavior.
///
/// ```
/// use nested_qs::{BoxError, Charset, Config, DecodeKind, decode_component};
///
/// fn shout(input: &str, charset: Charset, kind: DecodeKind) -> std::result::Result<String, BoxError> {
///     let decoded = decode_component(input, charset).into_owned();
///     Ok(match kind {
///         DecodeKind::Key => decoded,
///         DecodeKind::Value => decoded.to_uppercase(),
///     })
/// }
///
/// let config = Config::new().decoder(shout);
/// let value = config.parse_str("a=b%20c").unwrap();
/// assert_eq!(value["a"].as_str(), Some("B C"));
/// ```
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        input: &str,
        charset: Charset,
        kind: DecodeKind,
    ) -> std::result::Result<String, BoxError>;
}

impl<F> Decoder for F
where
    F: Fn(&str, Charset, DecodeKind) -> std::result::Result<String, BoxError> + Send + Sync,
{
    fn decode(
        &self,
        input: &str,
        charset: Charset,
        kind: DecodeKind,
    ) -> std::result::Result<String, BoxError> {
        self(input, charset, kind)
    }
}

#[inline(always)]
fn hex(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

/// Returns the value of the `%XX` escape at `idx`, if well formed.
#[inline]
fn escape_at(bytes: &[u8], idx: usize) -> Option<u8> {
    let h = hex(*bytes.get(idx + 1)?)?;
    let l = hex(*bytes.get(idx + 2)?)?;
    Some(h * 0x10 + l)
}

/// Position of the first `%` that does not start a valid escape.
fn malformed_escape(bytes: &[u8]) -> Option<usize> {
    memchr_iter(b'%', bytes).find(|&idx| escape_at(bytes, idx).is_none())
}

fn replace_plus(input: &str) -> Cow<'_, str> {
    match memchr(b'+', input.as_bytes()) {
        None => Cow::Borrowed(input),
        Some(_) => Cow::Owned(input.replace('+', " ")),
    }
}

/// Decodes one component the way `qs` does by default:
/// - `+` becomes a space
/// - with UTF-8, `%XX` escapes are decoded as UTF-8 bytes; if any escape is
///   malformed or the bytes are not valid UTF-8, the text is returned with
///   only the `+` substitution applied
/// - with Latin-1, each valid `%XX` is the code point of that byte, and
///   anything else is left alone
pub fn decode_component(input: &str, charset: Charset) -> Cow<'_, str> {
    match decode_with(input, charset, PercentDecoding::Lenient, 0) {
        Ok(decoded) => decoded,
        // lenient decoding does not fail
        Err(_) => replace_plus(input),
    }
}

/// Like [`decode_component`], but reports malformed input under the strict
/// profile. `base` is the offset of `input` within the querystring and is
/// only used for error positions.
pub(crate) fn decode_with(
    input: &str,
    charset: Charset,
    profile: PercentDecoding,
    base: usize,
) -> Result<Cow<'_, str>> {
    let bytes = input.as_bytes();
    if memchr2(b'%', b'+', bytes).is_none() {
        return Ok(Cow::Borrowed(input));
    }

    let strict = profile == PercentDecoding::Strict;
    if strict {
        if let Some(idx) = malformed_escape(bytes) {
            return Err(Error::InvalidPercentEncoding { offset: base + idx });
        }
    }

    let plus_replaced = replace_plus(input);
    if memchr(b'%', bytes).is_none() {
        return Ok(plus_replaced);
    }

    match charset {
        Charset::Utf8 => {
            if malformed_escape(bytes).is_some() {
                tracing::trace!(input, "malformed percent escape, keeping text");
                return Ok(plus_replaced);
            }
            let decoded = match percent_decode(plus_replaced.as_bytes()).decode_utf8() {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(_) => None,
            };
            match decoded {
                Some(decoded) => Ok(Cow::Owned(decoded)),
                None if strict => Err(Error::InvalidPercentEncoding { offset: base }),
                None => {
                    tracing::trace!(input, "percent escapes are not valid UTF-8, keeping text");
                    Ok(plus_replaced)
                }
            }
        }
        Charset::Latin1 => Ok(Cow::Owned(decode_latin1(&plus_replaced))),
    }
}

fn decode_latin1(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = String::with_capacity(input.len());
    let mut last_segment = 0;
    for idx in memchr_iter(b'%', bytes) {
        if idx < last_segment {
            // inside an escape that was just consumed
            continue;
        }
        if let Some(byte) = escape_at(bytes, idx) {
            decoded.push_str(&input[last_segment..idx]);
            decoded.push(char::from(byte));
            last_segment = idx + 3;
        }
    }
    decoded.push_str(&input[last_segment..]);
    decoded
}

/// Replaces `&#<digits>;` sequences with the character at that code point.
///
/// Sequences naming an invalid code point are left untouched.
pub fn interpret_numeric_entities(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let mut out: Option<String> = None;
    let mut last_segment = 0;
    for idx in memchr_iter(b'&', bytes) {
        if idx < last_segment || bytes.get(idx + 1) != Some(&b'#') {
            continue;
        }
        let digits_start = idx + 2;
        let digits_len = bytes[digits_start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let digits_end = digits_start + digits_len;
        if digits_len == 0 || bytes.get(digits_end) != Some(&b';') {
            continue;
        }
        let Some(c) = input[digits_start..digits_end]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
        else {
            continue;
        };
        let out = out.get_or_insert_with(|| String::with_capacity(input.len()));
        out.push_str(&input[last_segment..idx]);
        out.push(c);
        last_segment = digits_end + 1;
    }
    match out {
        None => Cow::Borrowed(input),
        Some(mut out) => {
            out.push_str(&input[last_segment..]);
            Cow::Owned(out)
        }
    }
}

/// Splits a raw value on literal commas. An encoded `%2C` is not a
/// separator. Returns `None` when the value contains no literal comma.
pub fn split_literal_comma(source: &str, span: Span) -> Option<impl Iterator<Item = Span> + '_> {
    let bytes = &source.as_bytes()[span.range()];
    memchr(b',', bytes)?;
    let start = span.offset as usize;
    let end = span.end() as usize;
    let mut cursor = start;
    let mut commas = memchr_iter(b',', bytes).map(move |idx| start + idx);
    let mut finished = false;
    Some(std::iter::from_fn(move || {
        if finished {
            return None;
        }
        let part_end = match commas.next() {
            Some(comma) => comma,
            None => {
                finished = true;
                end
            }
        };
        let part = Span::from_range(cursor, part_end);
        cursor = part_end + 1;
        Some(part)
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn fast_path_borrows() {
        assert!(matches!(
            decode_component("abc", Charset::Utf8),
            Cow::Borrowed("abc")
        ));
    }

    #[test]
    fn decodes_plus_and_escapes() {
        assert_eq!(decode_component("a+b%20c", Charset::Utf8), "a b c");
        assert_eq!(decode_component("%E2%9C%93", Charset::Utf8), "✓");
        assert_eq!(decode_component("%5Bx%5D", Charset::Utf8), "[x]");
    }

    #[test]
    fn malformed_utf8_input_is_kept() {
        assert_eq!(decode_component("100%+off", Charset::Utf8), "100% off");
        assert_eq!(decode_component("%ZZ%20", Charset::Utf8), "%ZZ%20");
        // a lone continuation byte
        assert_eq!(decode_component("%80", Charset::Utf8), "%80");
    }

    #[test]
    fn latin1_decodes_each_byte() {
        assert_eq!(decode_component("%E9", Charset::Latin1), "é");
        assert_eq!(decode_component("%E2%9C%93", Charset::Latin1), "â\u{9c}\u{93}");
        assert_eq!(decode_component("%ZZ%41+", Charset::Latin1), "%ZZA ");
    }

    #[test]
    fn strict_profile_rejects_malformed() {
        let err = decode_with("ab%2", Charset::Utf8, PercentDecoding::Strict, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidPercentEncoding { offset: 12 }));
        let err = decode_with("%FF", Charset::Utf8, PercentDecoding::Strict, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidPercentEncoding { .. }));
        assert_eq!(
            decode_with("%41", Charset::Utf8, PercentDecoding::Strict, 0).unwrap(),
            "A"
        );
    }

    #[test]
    fn numeric_entities() {
        assert_eq!(interpret_numeric_entities("&#9786;"), "☺");
        assert_eq!(interpret_numeric_entities("a&#65;b&#66;"), "aAbB");
        assert_eq!(interpret_numeric_entities("&#;&#x41;&#65"), "&#;&#x41;&#65");
        assert_eq!(interpret_numeric_entities("&#55296;"), "&#55296;");
        assert!(matches!(interpret_numeric_entities("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn comma_split_uses_literal_commas() {
        let source = "a=b,c%2Cd,";
        let span = Span::new(2, 9);
        let parts: Vec<&str> = split_literal_comma(source, span)
            .unwrap()
            .map(|s| &source[s.range()])
            .collect();
        assert_eq!(parts, vec!["b", "c%2Cd", ""]);

        assert!(split_literal_comma("a=b%2Cc", Span::new(2, 5)).is_none());
    }
}
