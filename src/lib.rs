//! Nested querystring parsing
//!
//! Querystrings are not formally defined and loosely take the form of
//! _nested_ urlencoded queries.
//!
//! This library parses them the way [qs](https://github.com/ljharb/qs) does,
//! into a [`Value`] tree of maps, lists and strings: bracket notation
//! (`a[b][c]=d`), optional dot notation (`a.b.c=d`), list indices and `[]`
//! appends, comma-separated values, charset sentinels, and the same limits on
//! depth, list indices and parameter counts.
//!
//! The result is an untyped tree. Parsing never binds to Rust types, so the
//! same [`Value`] can be inspected by index or handed to any serde format.
//!
//! ## Usage
//!
//! ```
//! let value = nested_qs::from_str(
//!     "name=Acme&address[city]=Carrot+City&user_ids[]=1&user_ids[]=2",
//! )
//! .unwrap();
//!
//! assert_eq!(value["name"].as_str(), Some("Acme"));
//! assert_eq!(value["address"]["city"].as_str(), Some("Carrot City"));
//! assert_eq!(value["user_ids"][1].as_str(), Some("2"));
//! ```
//!
//! ## Options
//!
//! Behaviour is tuned with a [`Config`], whose defaults match those of
//! `qs.parse`:
//!
//! ```
//! use nested_qs::{Config, Duplicates};
//!
//! let config = Config::new()
//!     .allow_dots(true)
//!     .comma(true)
//!     .duplicates(Duplicates::Last);
//!
//! let value = config.parse_str("a.b=1,2&c=x&c=y").unwrap();
//! assert_eq!(value["a"]["b"][0].as_str(), Some("1"));
//! assert_eq!(value["c"].as_str(), Some("y"));
//! ```
//!
//! ## Malicious keys
//!
//! Keys that would shadow `Object.prototype` members in JavaScript
//! (`constructor`, `hasOwnProperty`, ...) are dropped together with their
//! parameter unless [`Config::allow_prototypes`] is set. `__proto__` is
//! always dropped.
//!
//! ## Serialization
//!
//! [`Value`] implements `serde::Serialize`, so a parsed querystring can be
//! handed to any serde format:
//!
//! ```
//! let value = nested_qs::from_str("a[0]=b&a[1]=c").unwrap();
//! assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":["b","c"]}"#);
//! ```

mod config;
mod error;
pub mod map;
pub mod parse;
mod pool;
mod value;

#[doc(inline)]
pub use config::{Charset, Config, Delimiter, Duplicates, PercentDecoding};
#[doc(inline)]
pub use error::{BoxError, Error, Result};
#[doc(inline)]
pub use parse::Parser;
#[doc(inline)]
pub use parse::decode::{DecodeKind, Decoder, decode_component};
#[doc(inline)]
pub use value::Value;

/// Parses a querystring from a `&str` with the default [`Config`].
///
/// ```
/// let value = nested_qs::from_str("a[b][c]=d").unwrap();
/// assert_eq!(value["a"]["b"]["c"].as_str(), Some("d"));
/// ```
pub fn from_str(input: &str) -> Result<Value> {
    Config::default().parse_str(input)
}

/// Parses a querystring from a `&[u8]` with the default [`Config`].
pub fn from_bytes(input: &[u8]) -> Result<Value> {
    Config::default().parse_bytes(input)
}
