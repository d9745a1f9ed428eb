//! Nested config flattening to dotted column names

use serde_json::{Map, Value};

/// Flatten a nested config into `(dotted.key, leaf)` pairs.
///
/// Objects recurse; arrays and scalars are leaves. Empty objects produce
/// no column. Keys come out in the map's (sorted) order.
///
/// ```rust
/// use fanda::table::flatten_config;
/// use serde_json::json;
///
/// let config = json!({"optimizer": {"lr": 0.1, "name": "adam"}, "seed": 3});
/// let flat = flatten_config(config.as_object().unwrap());
/// let keys: Vec<_> = flat.iter().map(|(k, _)| k.as_str()).collect();
/// assert_eq!(keys, ["optimizer.lr", "optimizer.name", "seed"]);
/// ```
#[must_use]
pub fn flatten_config(config: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(None, config, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = prefix.map_or_else(|| key.clone(), |p| format!("{p}.{key}"));
        match value {
            Value::Object(inner) => flatten_into(Some(&name), inner, out),
            leaf => out.push((name, leaf.clone())),
        }
    }
}
