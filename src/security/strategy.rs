//! Redaction strategies.
//!
//! Each strategy maps one value to its redacted replacement:
//! - `mask` keeps a few characters and stars out the rest
//! - `hash` replaces the value with its SHA-256 hex digest
//! - `drop` replaces the value with a fixed marker

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::record::path::value_to_string;

/// Marker written by the `drop` strategy.
pub const REDACTED_MARKER: &str = "[REDACTED]";

const MASK_CHAR: char = '*';
const EMAIL_SEGMENT_MASK: &str = "***";

/// How a sensitive value is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RedactionStrategy {
    #[default]
    Mask,
    Hash,
    Drop,
}

impl RedactionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionStrategy::Mask => "mask",
            RedactionStrategy::Hash => "hash",
            RedactionStrategy::Drop => "drop",
        }
    }

    /// Redact a single value. `null` passes through unchanged.
    pub fn apply(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            RedactionStrategy::Mask => mask_value(value),
            RedactionStrategy::Hash => Value::String(hash_string(&value_to_string(value))),
            RedactionStrategy::Drop => Value::String(REDACTED_MARKER.to_string()),
        }
    }
}

impl fmt::Display for RedactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedactionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mask" => Ok(RedactionStrategy::Mask),
            "hash" => Ok(RedactionStrategy::Hash),
            "drop" => Ok(RedactionStrategy::Drop),
            other => Err(format!("unknown redaction strategy {:?}", other)),
        }
    }
}

/// Mask scalars through their string form; containers become the marker.
fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string(s)),
        Value::Number(_) | Value::Bool(_) => Value::String(mask_string(&value.to_string())),
        _ => Value::String(REDACTED_MARKER.to_string()),
    }
}

/// Mask a string, preserving the structure of email addresses.
///
/// # Examples
/// ```
/// use wideevent_core::security::mask_string;
///
/// assert_eq!(mask_string("john@example.com"), "j***@e***.com");
/// assert_eq!(mask_string("4111111111111111"), "4**************1");
/// assert_eq!(mask_string("ab"), "**");
/// ```
pub fn mask_string(s: &str) -> String {
    match s.split_once('@') {
        Some((local, domain)) => format!("{}@{}", mask_email_local(local), mask_domain(domain)),
        None => mask_plain(s),
    }
}

fn mask_email_local(local: &str) -> String {
    match local.chars().next() {
        Some(first) => format!("{}{}", first, EMAIL_SEGMENT_MASK),
        None => EMAIL_SEGMENT_MASK.to_string(),
    }
}

/// Mask every label except the last one (the TLD).
fn mask_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    let last = labels.len().saturating_sub(1);
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            if i == last && labels.len() > 1 {
                label.to_string()
            } else {
                mask_email_local(label)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Keep first and last character; strings of two or fewer are fully masked.
fn mask_plain(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 2 {
        return MASK_CHAR.to_string().repeat(chars.len());
    }
    let interior = MASK_CHAR.to_string().repeat(chars.len() - 2);
    format!("{}{}{}", chars[0], interior, chars[chars.len() - 1])
}

/// Lowercase hex SHA-256 of a string's UTF-8 bytes.
pub fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
