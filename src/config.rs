use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::Result;
use crate::parse::decode::Decoder;
use crate::value::Value;

/// Character set used to interpret percent-encoded bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    /// `iso-8859-1`: every `%XX` escape is one code point.
    Latin1,
}

/// How to treat a key that appears more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Duplicates {
    /// Collect every value into a list: `a=1&a=2` gives `["1", "2"]`.
    #[default]
    Combine,
    /// Keep the first value.
    First,
    /// Keep the last value.
    Last,
}

/// How malformed `%XX` escapes are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PercentDecoding {
    /// Text that fails to decode is kept as-is.
    #[default]
    Lenient,
    /// Malformed escapes, or escapes that do not form valid UTF-8,
    /// fail the parse with [`Error::InvalidPercentEncoding`](crate::Error).
    Strict,
}

/// Separator between parameters.
#[derive(Clone, Debug)]
pub enum Delimiter {
    Char(char),
    Pattern(Regex),
}

impl Delimiter {
    /// Builds a pattern delimiter, e.g. `[;,]` to split on either character.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Delimiter::Pattern(Regex::new(pattern)?))
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Char('&')
    }
}

impl From<char> for Delimiter {
    fn from(c: char) -> Self {
        Delimiter::Char(c)
    }
}

impl From<Regex> for Delimiter {
    fn from(re: Regex) -> Self {
        Delimiter::Pattern(re)
    }
}

/// Configuration for parsing behavior.
///
/// The defaults match those of `qs.parse`:
///
/// ```
/// use nested_qs::Config;
///
/// let config = Config::new();
/// let value = config.parse_str("a[b][c]=d").unwrap();
/// assert_eq!(value["a"]["b"]["c"].as_str(), Some("d"));
///
/// let flat = Config::new().depth(0).parse_str("a[b][c]=d").unwrap();
/// assert_eq!(flat["a[b][c]"].as_str(), Some("d"));
/// ```
///
/// ## Limits
///
/// `depth` bounds how many bracket or dot segments of a key are parsed; the
/// rest of the key is kept as one literal segment (or rejected with
/// `strict_depth`). `array_limit` is the largest index that still produces a
/// list; larger indices become map keys. `parameter_limit` bounds how many
/// parameters are read at all, 0 meaning no bound.
#[derive(Clone)]
pub struct Config {
    pub(crate) delimiter: Delimiter,
    pub(crate) parameter_limit: usize,
    pub(crate) throw_on_limit_exceeded: bool,
    pub(crate) ignore_query_prefix: bool,
    pub(crate) charset: Charset,
    pub(crate) charset_sentinel: bool,
    pub(crate) allow_dots: bool,
    pub(crate) decode_dot_in_keys: bool,
    pub(crate) depth: usize,
    pub(crate) strict_depth: bool,
    pub(crate) parse_arrays: bool,
    pub(crate) array_limit: usize,
    pub(crate) comma: bool,
    pub(crate) interpret_numeric_entities: bool,
    pub(crate) strict_null_handling: bool,
    pub(crate) allow_prototypes: bool,
    pub(crate) allow_sparse: bool,
    pub(crate) allow_empty_arrays: bool,
    pub(crate) duplicates: Duplicates,
    pub(crate) percent_decoding: PercentDecoding,
    pub(crate) decoder: Option<Arc<dyn Decoder>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("delimiter", &self.delimiter)
            .field("parameter_limit", &self.parameter_limit)
            .field("throw_on_limit_exceeded", &self.throw_on_limit_exceeded)
            .field("ignore_query_prefix", &self.ignore_query_prefix)
            .field("charset", &self.charset)
            .field("charset_sentinel", &self.charset_sentinel)
            .field("allow_dots", &self.allow_dots)
            .field("decode_dot_in_keys", &self.decode_dot_in_keys)
            .field("depth", &self.depth)
            .field("strict_depth", &self.strict_depth)
            .field("parse_arrays", &self.parse_arrays)
            .field("array_limit", &self.array_limit)
            .field("comma", &self.comma)
            .field("interpret_numeric_entities", &self.interpret_numeric_entities)
            .field("strict_null_handling", &self.strict_null_handling)
            .field("allow_prototypes", &self.allow_prototypes)
            .field("allow_sparse", &self.allow_sparse)
            .field("allow_empty_arrays", &self.allow_empty_arrays)
            .field("duplicates", &self.duplicates)
            .field("percent_decoding", &self.percent_decoding)
            .field("decoder", &self.decoder.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            delimiter: Delimiter::Char('&'),
            parameter_limit: 1000,
            throw_on_limit_exceeded: false,
            ignore_query_prefix: false,
            charset: Charset::Utf8,
            charset_sentinel: false,
            allow_dots: false,
            decode_dot_in_keys: false,
            depth: 5,
            strict_depth: false,
            parse_arrays: true,
            array_limit: 20,
            comma: false,
            interpret_numeric_entities: false,
            strict_null_handling: false,
            allow_prototypes: false,
            allow_sparse: false,
            allow_empty_arrays: false,
            duplicates: Duplicates::Combine,
            percent_decoding: PercentDecoding::Lenient,
            decoder: None,
        }
    }

    /// Separator between parameters. Default is `&`.
    pub fn delimiter(mut self, delimiter: impl Into<Delimiter>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Maximum number of parameters to read. Default is 1000; 0 disables
    /// the limit.
    pub fn parameter_limit(mut self, limit: usize) -> Self {
        self.parameter_limit = limit;
        self
    }

    /// Fail with [`Error::ParameterLimitExceeded`](crate::Error) instead of
    /// silently dropping the parameters past `parameter_limit`.
    pub fn throw_on_limit_exceeded(mut self, throw: bool) -> Self {
        self.throw_on_limit_exceeded = throw;
        self
    }

    /// Skip a leading `?`.
    pub fn ignore_query_prefix(mut self, ignore: bool) -> Self {
        self.ignore_query_prefix = ignore;
        self
    }

    /// Charset used for decoding when no sentinel overrides it.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Detect the charset from a `utf8=✓` parameter, as sent by Rails-style
    /// forms. The sentinel itself is not part of the result.
    pub fn charset_sentinel(mut self, detect: bool) -> Self {
        self.charset_sentinel = detect;
        self
    }

    /// Treat `a.b` like `a[b]`.
    pub fn allow_dots(mut self, allow: bool) -> Self {
        self.allow_dots = allow;
        self
    }

    /// Treat `%2E` in keys as a dot. Enabling this also enables
    /// [`allow_dots`](Self::allow_dots).
    pub fn decode_dot_in_keys(mut self, decode: bool) -> Self {
        self.decode_dot_in_keys = decode;
        if decode {
            self.allow_dots = true;
        }
        self
    }

    /// Maximum number of nested key segments. Default is 5; 0 keeps every
    /// key flat.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Fail with [`Error::DepthLimitExceeded`](crate::Error) instead of
    /// keeping over-deep keys as literal segments.
    pub fn strict_depth(mut self, strict: bool) -> Self {
        self.strict_depth = strict;
        self
    }

    /// Build lists from `a[]` and `a[0]`. When disabled, indices become map
    /// keys.
    pub fn parse_arrays(mut self, parse: bool) -> Self {
        self.parse_arrays = parse;
        self
    }

    /// Largest index that still produces a list entry. Default is 20.
    pub fn array_limit(mut self, limit: usize) -> Self {
        self.array_limit = limit;
        self
    }

    /// Split values on literal commas: `a=b,c` gives `["b", "c"]`.
    pub fn comma(mut self, comma: bool) -> Self {
        self.comma = comma;
        self
    }

    /// Turn `&#9786;` into `☺` in Latin-1 values.
    pub fn interpret_numeric_entities(mut self, interpret: bool) -> Self {
        self.interpret_numeric_entities = interpret;
        self
    }

    /// Parse `a` (without `=`) as null rather than an empty string.
    pub fn strict_null_handling(mut self, strict: bool) -> Self {
        self.strict_null_handling = strict;
        self
    }

    /// Accept keys such as `constructor` or `hasOwnProperty`. `__proto__`
    /// is always dropped.
    pub fn allow_prototypes(mut self, allow: bool) -> Self {
        self.allow_prototypes = allow;
        self
    }

    /// Keep holes in lists (as `Null`) instead of compacting them.
    pub fn allow_sparse(mut self, allow: bool) -> Self {
        self.allow_sparse = allow;
        self
    }

    /// Parse `a[]=` as an empty list.
    pub fn allow_empty_arrays(mut self, allow: bool) -> Self {
        self.allow_empty_arrays = allow;
        self
    }

    pub fn duplicates(mut self, duplicates: Duplicates) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn percent_decoding(mut self, profile: PercentDecoding) -> Self {
        self.percent_decoding = profile;
        self
    }

    /// Replace the default decoder for keys and values.
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Parses a querystring from a `&str` using this `Config`.
    pub fn parse_str(&self, input: &str) -> Result<Value> {
        crate::pool::with_parser(|parser| parser.parse(input, self))
    }

    /// Parses a querystring from a `&[u8]` using this `Config`.
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Value> {
        self.parse_str(std::str::from_utf8(input)?)
    }
}
