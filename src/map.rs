//! The map type backing [`Value::Map`](crate::Value::Map).
//!
//! Keys are sorted by default. With the `indexmap` feature, maps keep the
//! order in which keys first appeared in the querystring.

#[cfg(not(feature = "indexmap"))]
pub type Map<K, V> = std::collections::BTreeMap<K, V>;

#[cfg(feature = "indexmap")]
pub type Map<K, V> = indexmap::IndexMap<K, V>;
