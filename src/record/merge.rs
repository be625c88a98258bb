//! Depth-bounded deep merge and snapshots.

use serde_json::{Map, Value};

/// Default recursion bound for [`merge_deep`].
pub const DEFAULT_MERGE_DEPTH: usize = 5;

/// Merge `source` into a copy of `target`.
///
/// Keys present in both whose values are both objects are merged
/// recursively; otherwise the source value wins. Arrays and scalars are
/// replaced wholesale. Neither input is mutated.
pub fn merge_deep(target: &Value, source: &Value) -> Value {
    merge_deep_bounded(target, source, DEFAULT_MERGE_DEPTH)
}

/// [`merge_deep`] with an explicit depth bound.
///
/// Objects nested deeper than `max_depth` levels are overwritten flat
/// instead of merged.
pub fn merge_deep_bounded(target: &Value, source: &Value, max_depth: usize) -> Value {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => Value::Object(merge_maps(t, s, 0, max_depth)),
        _ => source.clone(),
    }
}

fn merge_maps(
    target: &Map<String, Value>,
    source: &Map<String, Value>,
    depth: usize,
    max_depth: usize,
) -> Map<String, Value> {
    let mut out = target.clone();
    for (key, src_val) in source {
        let merged = match (out.get(key), src_val) {
            (Some(Value::Object(t)), Value::Object(s)) if depth + 1 < max_depth => {
                Value::Object(merge_maps(t, s, depth + 1, max_depth))
            }
            _ => src_val.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

/// Deep, structurally independent copy of a value.
///
/// Every record crossing a stage boundary goes through here so later
/// stages can never observe or alter the live builder state.
pub fn snapshot(value: &Value) -> Value {
    value.clone()
}
