//! The parsing pipeline.
//!
//! Parsing happens in two passes over an [`Arena`]:
//!
//! 1. [`tokenize`] splits the input into parameters, splits each key into
//!    segments and each value into comma parts, recording only spans.
//! 2. [`Builder::build`] decodes those spans and merges every parameter
//!    into a nested [`Value`].
//!
//! [`Parser`] bundles an arena and a builder so both can be reused.
//!
//! ```
//! use nested_qs::Config;
//! use nested_qs::parse::{Arena, Builder, tokenize};
//!
//! let config = Config::new();
//! let mut arena = Arena::new("a[b]=1&a[c]=2");
//! let (query, charset) = tokenize(&mut arena, &config).unwrap();
//! assert_eq!(arena.parameters(&query).len(), 2);
//!
//! let value = Builder::new().build(&arena, &query, charset, &config).unwrap();
//! assert_eq!(value["a"]["c"].as_str(), Some("2"));
//! ```

mod arena;
mod build;
pub mod decode;
mod key_path;
mod tokenize;

pub use arena::{
    Arena, Key, Notation, ParamValue, Parameter, QueryString, Segment, SegmentKind, Span,
    ValueKind,
};
pub use build::{Builder, build};
pub use tokenize::{LATIN1_SENTINEL, UTF8_SENTINEL, tokenize};

use crate::config::Config;
use crate::error::Result;
use crate::value::Value;

/// A reusable parser.
///
/// Keeps the arena tables and the builder cache between calls, so repeated
/// parses on one thread stop allocating once the tables have grown to fit
/// the inputs. The crate-level [`from_str`](crate::from_str) uses a
/// thread-local `Parser`.
#[derive(Debug, Default)]
pub struct Parser {
    arena: Option<Arena<'static>>,
    builder: Builder,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, input: &str, config: &Config) -> Result<Value> {
        let mut arena = self.arena.take().unwrap_or_default().reset(input)?;
        let result = tokenize(&mut arena, config).and_then(|(query, charset)| {
            self.builder.build(&arena, &query, charset, config)
        });
        self.arena = Some(arena.detach());
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parser_reuse_does_not_leak() {
        let config = Config::new();
        let mut parser = Parser::new();
        let first = parser.parse("a=1&b=2&c=3", &config).unwrap();
        assert_eq!(first.as_map().map(|m| m.len()), Some(3));

        let second = parser.parse("d=4", &config).unwrap();
        assert_eq!(second.as_map().map(|m| m.len()), Some(1));
        assert!(second["a"].is_null());
    }

    #[test]
    fn parser_survives_errors() {
        let config = Config::new().depth(1).strict_depth(true);
        let mut parser = Parser::new();
        assert!(parser.parse("a[b][c]=d", &config).is_err());
        let value = parser.parse("a[b]=d", &config).unwrap();
        assert_eq!(value["a"]["b"].as_str(), Some("d"));
    }

    #[test]
    fn arena_reset_counts_only_new_parameters() {
        let config = Config::new();
        let mut arena = Arena::new("a=1&b=2&c=3");
        let (query, _) = tokenize(&mut arena, &config).unwrap();
        assert_eq!(arena.parameters(&query).len(), 3);

        let mut arena = arena.reset("x=1").unwrap();
        let (query, _) = tokenize(&mut arena, &config).unwrap();
        assert_eq!(arena.parameter_count(), 1);
        assert_eq!(arena.parameters(&query).len(), 1);
    }
}
