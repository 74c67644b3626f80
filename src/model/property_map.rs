//! PropertyMap: the named values carried by every element.

use std::collections::BTreeMap;

use super::Value;

/// Property names to values, kept in name order so that debug output and
/// serialized elements are stable.
pub type PropertyMap = BTreeMap<String, Value>;

/// Build a map from `(name, value)` pairs.
pub fn properties<K, V, I>(pairs: I) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
