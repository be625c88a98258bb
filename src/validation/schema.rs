//! Record schema definitions.
//!
//! A schema is plain configuration data: required dot-paths, per-path field
//! definitions and an unknown-key policy. Built-in definitions for reserved
//! fields are always layered underneath user-supplied ones.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::config::{lenient_option, lenient_or_default};
use crate::record::fields::*;
use crate::record::path::{is_valid_path, top_level_key};
use crate::security::strategy::RedactionStrategy;

/// Shallow runtime type a field is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    /// Check a value's shape. `null` always matches.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }

    /// Name of a value's runtime shape, for diagnostics.
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "object" => Ok(FieldType::Object),
            "array" => Ok(FieldType::Array),
            other => Err(format!("unknown field type {:?}", other)),
        }
    }
}

/// Expected number of distinct values. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Low,
    Medium,
    High,
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Cardinality::Low),
            "medium" => Ok(Cardinality::Medium),
            "high" => Ok(Cardinality::High),
            other => Err(format!("unknown cardinality {:?}", other)),
        }
    }
}

/// What to do with top-level keys no schema path mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    #[default]
    Allow,
    Warn,
    Deny,
}

impl FromStr for UnknownKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(UnknownKeyPolicy::Allow),
            "warn" => Ok(UnknownKeyPolicy::Warn),
            "deny" => Ok(UnknownKeyPolicy::Deny),
            other => Err(format!("unknown key policy {:?}", other)),
        }
    }
}

/// Definition of a single dot-path field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type", default, deserialize_with = "lenient_option")]
    pub field_type: Option<FieldType>,
    /// Redacted before validation; its type is then no longer checked.
    #[serde(default)]
    pub pii: bool,
    /// Redaction strategy overriding the global one for this path.
    #[serde(default, deserialize_with = "lenient_option")]
    pub redact: Option<RedactionStrategy>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub cardinality: Option<Cardinality>,
}

impl FieldDefinition {
    pub fn typed(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Self::default()
        }
    }

    pub fn pii(mut self) -> Self {
        self.pii = true;
        self
    }

    pub fn redact_with(mut self, strategy: RedactionStrategy) -> Self {
        self.redact = Some(strategy);
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }
}

/// Types of the reserved fields, always merged under user definitions.
pub const BUILTIN_FIELDS: &[(&str, FieldType)] = &[
    (TIMESTAMP, FieldType::String),
    (REQUEST_ID, FieldType::String),
    (TRACE_ID, FieldType::String),
    (SPAN_ID, FieldType::String),
    (SERVICE, FieldType::String),
    (SERVICE_VERSION, FieldType::String),
    (ENVIRONMENT, FieldType::String),
    (METHOD, FieldType::String),
    (PATH, FieldType::String),
    (IP, FieldType::String),
    (USER_AGENT, FieldType::String),
    (STATUS_CODE, FieldType::Number),
    (DURATION_MS, FieldType::Number),
    (OUTCOME, FieldType::String),
    (ERROR, FieldType::Object),
];

/// User-supplied record schema.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default, alias = "unknownKeys", deserialize_with = "lenient_or_default")]
    pub unknown_keys: UnknownKeyPolicy,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required(mut self, path: &str) -> Self {
        self.required.push(path.to_string());
        self
    }

    pub fn with_field(mut self, path: &str, definition: FieldDefinition) -> Self {
        self.fields.insert(path.to_string(), definition);
        self
    }

    pub fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }

    /// User definition for a path, without built-ins.
    pub fn field_definition(&self, path: &str) -> Option<&FieldDefinition> {
        self.fields.get(path)
    }

    /// Built-in definitions overlaid with user definitions.
    pub fn effective_fields(&self) -> BTreeMap<String, FieldDefinition> {
        let mut fields = builtin_field_definitions();
        for (path, def) in &self.fields {
            fields.insert(path.clone(), def.clone());
        }
        fields
    }

    /// Paths flagged as personal data.
    pub fn pii_paths(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.pii)
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Top-level keys the unknown-key policy treats as declared.
    pub fn known_top_level_keys(&self) -> HashSet<String> {
        let mut known: HashSet<String> = BUILTIN_REQUIRED_FIELDS
            .iter()
            .map(|k| k.to_string())
            .collect();
        known.extend(BUILTIN_FIELDS.iter().map(|(k, _)| k.to_string()));
        known.extend(self.required.iter().map(|p| top_level_key(p).to_string()));
        known.extend(self.fields.keys().map(|p| top_level_key(p).to_string()));
        known
    }

    /// Drop malformed paths, logging each one.
    pub fn normalized(mut self) -> Self {
        self.required.retain(|path| {
            let ok = is_valid_path(path);
            if !ok {
                log::warn!("SCHEMA_PATH_IGNORED kind=required path={:?}", path);
            }
            ok
        });
        self.fields.retain(|path, _| {
            let ok = is_valid_path(path);
            if !ok {
                log::warn!("SCHEMA_PATH_IGNORED kind=field path={:?}", path);
            }
            ok
        });
        self
    }
}

/// Built-in reserved field definitions.
pub fn builtin_field_definitions() -> BTreeMap<String, FieldDefinition> {
    BUILTIN_FIELDS
        .iter()
        .map(|(path, ty)| (path.to_string(), FieldDefinition::typed(*ty)))
        .collect()
}
