//! Field-level redaction of finalized records.
//!
//! Works on a copy: the input record is never modified, even when redaction
//! is disabled.

use serde::Deserialize;
use serde_json::Value;

use crate::config::lenient_or_default;
use crate::logging::structured::LogContext;
use crate::record::merge::snapshot;
use crate::record::path::{get_path, is_valid_path, set_path_in_place};
use crate::security::strategy::RedactionStrategy;
use crate::validation::schema::Schema;

/// Paths redacted when no explicit list is configured.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "authorization",
    "cookie",
    "credit_card",
    "card_number",
    "ssn",
    "user.email",
    "user.password",
    "user.phone",
    "headers.authorization",
    "headers.cookie",
];

/// Redaction settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub strategy: RedactionStrategy,
    /// Explicit dot-paths. Empty means [`DEFAULT_SENSITIVE_FIELDS`].
    #[serde(default)]
    pub fields: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: RedactionStrategy::default(),
            fields: Vec::new(),
        }
    }
}

impl RedactionConfig {
    pub fn new(strategy: RedactionStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Configured paths, or the default sensitive list.
    pub fn target_paths(&self) -> Vec<&str> {
        if self.fields.is_empty() {
            DEFAULT_SENSITIVE_FIELDS.to_vec()
        } else {
            self.fields.iter().map(String::as_str).collect()
        }
    }

    /// Drop malformed paths, logging each one.
    pub fn normalized(mut self) -> Self {
        self.fields.retain(|path| {
            let ok = is_valid_path(path);
            if !ok {
                log::warn!("REDACTION_PATH_IGNORED path={:?}", path);
            }
            ok
        });
        self
    }
}

/// Paths that were rewritten by one redaction pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedactionReport {
    pub redacted: Vec<(String, RedactionStrategy)>,
}

impl RedactionReport {
    pub fn fields_redacted(&self) -> usize {
        self.redacted.len()
    }
}

/// Redact a record and return the copy.
pub fn apply_redaction(
    record: &Value,
    config: Option<&RedactionConfig>,
    schema: Option<&Schema>,
) -> Value {
    redact(record, config, schema).0
}

/// Redact a record, logging what was touched.
pub fn redact_record(
    record: &Value,
    config: Option<&RedactionConfig>,
    schema: Option<&Schema>,
    ctx: &LogContext,
) -> (Value, RedactionReport) {
    let (redacted, report) = redact(record, config, schema);

    if report.fields_redacted() > 0 {
        log::debug!(
            "{} REDACTION_APPLIED fields={} paths={:?}",
            ctx,
            report.fields_redacted(),
            report.redacted.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>()
        );
    }

    (redacted, report)
}

fn redact(
    record: &Value,
    config: Option<&RedactionConfig>,
    schema: Option<&Schema>,
) -> (Value, RedactionReport) {
    let mut out = snapshot(record);
    let mut report = RedactionReport::default();

    let config = match config {
        Some(cfg) if cfg.enabled => cfg,
        _ => return (out, report),
    };

    for path in collect_targets(config, schema) {
        let current = match get_path(&out, path) {
            Some(value) if !value.is_null() => value,
            _ => continue,
        };

        let strategy = schema
            .and_then(|s| s.field_definition(path))
            .and_then(|def| def.redact)
            .unwrap_or(config.strategy);

        let replacement = strategy.apply(current);
        if set_path_in_place(&mut out, path, replacement) {
            report.redacted.push((path.to_string(), strategy));
        }
    }

    (out, report)
}

/// Configured targets plus schema PII paths, without duplicates.
fn collect_targets<'a>(config: &'a RedactionConfig, schema: Option<&'a Schema>) -> Vec<&'a str> {
    let schema_paths = schema.map(Schema::pii_paths).unwrap_or_default();
    let mut targets: Vec<&str> = Vec::new();
    for path in config.target_paths().into_iter().chain(schema_paths) {
        if !targets.contains(&path) {
            targets.push(path);
        }
    }
    targets
}
