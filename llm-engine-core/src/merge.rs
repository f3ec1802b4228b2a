//! Recursive merge over JSON object graphs.

use serde_json::Value;

/// Merge `overlay` onto `base`, returning the combined value.
///
/// Mappings are merged key by key; arrays and scalars are replaced wholesale.
/// Used to emulate a server-side merge for custom-resource kinds where patch
/// is unreliable: read, merge the new body over the old, replace.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
