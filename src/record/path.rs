//! Dot-path resolution.
//!
//! Resolves dot-notation paths like "user.email" against a record. Only
//! objects are traversed; arrays and scalars terminate a lookup.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    /// One or more non-empty segments without whitespace, separated by dots.
    static ref PATH_PATTERN: Regex = Regex::new(r"^[^.\s]+(\.[^.\s]+)*$").unwrap();
}

/// Check dot-path syntax.
///
/// Used when loading configuration so malformed paths can be dropped early.
pub fn is_valid_path(path: &str) -> bool {
    PATH_PATTERN.is_match(path)
}

/// Split a path into segments, rejecting empty ones.
fn segments(path: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

/// Resolve a dot-notation path to a value.
///
/// Returns `None` if any intermediate segment is absent or is not an
/// object. An empty path resolves to the root.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use wideevent_core::record::get_path;
///
/// let data = json!({"user": {"email": "a@b.com"}});
/// assert_eq!(get_path(&data, "user.email"), Some(&json!("a@b.com")));
/// assert_eq!(get_path(&data, "user.name"), None);
/// ```
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for part in segments(path)? {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// True only if every segment exists as a key.
///
/// A key present with a `null` value counts as present.
pub fn has_path(root: &Value, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    get_path(root, path).is_some()
}

/// Return a copy of `root` with `value` written at `path`.
///
/// Intermediate objects are created as needed and non-object intermediates
/// are replaced by empty objects. The input is never mutated. A malformed
/// path (empty, or containing an empty segment) leaves the copy unchanged.
pub fn set_path(root: &Value, path: &str, value: Value) -> Value {
    let mut out = root.clone();
    set_path_in_place(&mut out, path, value);
    out
}

/// In-place variant of [`set_path`] for owned values.
///
/// Returns false when the path is malformed and nothing was written.
pub(crate) fn set_path_in_place(root: &mut Value, path: &str, value: Value) -> bool {
    let parts = match segments(path) {
        Some(parts) if !path.is_empty() => parts,
        _ => return false,
    };

    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return false,
    };

    let mut current = root;
    for part in parents {
        coerce_object(current);
        current = match current {
            Value::Object(obj) => obj
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return false,
        };
    }
    coerce_object(current);
    match current {
        Value::Object(obj) => {
            obj.insert(last.to_string(), value);
            true
        }
        _ => false,
    }
}

/// Replace a non-object value with `{}`.
fn coerce_object(value: &mut Value) {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
}

/// First segment of a dot-path, used for top-level key bookkeeping.
pub fn top_level_key(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// String form of a value as used by redaction.
///
/// Strings are taken verbatim, everything else as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
