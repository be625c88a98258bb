//! Record validation.
//!
//! Produces errors and warnings; never mutates the record. Whether an
//! invalid record is emitted is decided by the caller (strict mode).

use serde_json::Value;
use thiserror::Error;

use crate::logging::structured::LogContext;
use crate::record::fields::BUILTIN_REQUIRED_FIELDS;
use crate::record::path::{get_path, has_path};
use crate::validation::schema::{builtin_field_definitions, FieldType, Schema, UnknownKeyPolicy};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("missing required field {path}")]
    MissingRequired { path: String },

    #[error("field {path} expected {expected} but found {actual}")]
    TypeMismatch {
        path: String,
        expected: FieldType,
        actual: &'static str,
    },

    #[error("unknown top-level key {key}")]
    UnknownKey { key: String },
}

/// Outcome of validating one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Emit every finding as a diagnostic line.
    pub fn log(&self, ctx: &LogContext) {
        for issue in &self.errors {
            log::error!("{} VALIDATION_ERROR {}", ctx, issue);
        }
        for issue in &self.warnings {
            log::warn!("{} VALIDATION_WARNING {}", ctx, issue);
        }
    }
}

/// Validate a record.
///
/// Built-in required fields are always checked. With a schema, its required
/// paths, field types and unknown-key policy apply as well. Type mismatches
/// and denied keys are errors only when `strict` is set.
pub fn validate(record: &Value, schema: Option<&Schema>, strict: bool) -> ValidationResult {
    validate_redacted(record, schema, strict, &[])
}

/// Validate a redacted view.
///
/// Paths in `redacted` were rewritten by a redaction strategy and may no
/// longer carry their declared type, so they are only checked for presence.
pub fn validate_redacted(
    record: &Value,
    schema: Option<&Schema>,
    strict: bool,
    redacted: &[&str],
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // [1] REQUIRED FIELDS
    let mut required: Vec<&str> = BUILTIN_REQUIRED_FIELDS.to_vec();
    if let Some(schema) = schema {
        for path in &schema.required {
            if !required.contains(&path.as_str()) {
                required.push(path);
            }
        }
    }
    for path in required {
        if !has_path(record, path) {
            errors.push(ValidationIssue::MissingRequired {
                path: path.to_string(),
            });
        }
    }

    // [2] TYPE CHECKS
    let fields = match schema {
        Some(schema) => schema.effective_fields(),
        None => builtin_field_definitions(),
    };
    for (path, def) in &fields {
        let Some(expected) = def.field_type else {
            continue;
        };
        if redacted.contains(&path.as_str()) {
            continue;
        }
        let Some(value) = get_path(record, path) else {
            continue;
        };
        if !expected.matches(value) {
            let issue = ValidationIssue::TypeMismatch {
                path: path.clone(),
                expected,
                actual: FieldType::describe(value),
            };
            if strict {
                errors.push(issue);
            } else {
                warnings.push(issue);
            }
        }
    }

    // [3] UNKNOWN TOP-LEVEL KEYS
    if let (Some(schema), Value::Object(obj)) = (schema, record) {
        if schema.unknown_keys != UnknownKeyPolicy::Allow {
            let known = schema.known_top_level_keys();
            for key in obj.keys().filter(|k| !known.contains(k.as_str())) {
                let issue = ValidationIssue::UnknownKey { key: key.clone() };
                match schema.unknown_keys {
                    UnknownKeyPolicy::Deny if strict => errors.push(issue),
                    _ => warnings.push(issue),
                }
            }
        }
    }

    ValidationResult::from_issues(errors, warnings)
}
