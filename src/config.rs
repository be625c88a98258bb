//! Pipeline configuration.
//!
//! Configuration is plain data consumed by the pipeline. Invalid values
//! degrade to documented defaults with a warning; only documents that are
//! not JSON at all (or unreadable files) are errors.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::sampling::decision::SamplingConfig;
use crate::security::redaction::RedactionConfig;
use crate::validation::schema::Schema;

pub const ENV_STRICT: &str = "WIDEEVENT_STRICT";
pub const ENV_DEBUG: &str = "WIDEEVENT_DEBUG";
pub const ENV_SAMPLE_RATE: &str = "WIDEEVENT_SAMPLE_RATE";
pub const ENV_SLOW_THRESHOLD_MS: &str = "WIDEEVENT_SLOW_THRESHOLD_MS";

/// Everything the lifecycle needs besides its collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub redaction: Option<RedactionConfig>,
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Block emission of invalid records and escalate warnings to errors.
    #[serde(default)]
    pub strict: bool,
    /// Always emit, bypassing tail sampling.
    #[serde(default)]
    pub debug: bool,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_redaction(mut self, redaction: RedactionConfig) -> Self {
        self.redaction = Some(redaction);
        self
    }

    pub fn with_sampling(mut self, sampling: impl Into<SamplingConfig>) -> Self {
        self.sampling = sampling.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Parse a JSON document and normalize it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        log::info!(
            "CONFIG_LOADED path={} bytes={}",
            path.as_ref().display(),
            contents.len()
        );
        Self::from_json(&contents)
    }

    /// Overlay `WIDEEVENT_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strict) = read_override(&lookup, ENV_STRICT, parse_flag) {
            self.strict = strict;
        }
        if let Some(debug) = read_override(&lookup, ENV_DEBUG, parse_flag) {
            self.debug = debug;
        }
        if let Some(rate) = read_override(&lookup, ENV_SAMPLE_RATE, |v| v.parse::<f64>().ok()) {
            self.sampling.sample_rate_success = rate;
        }
        if let Some(ms) = read_override(&lookup, ENV_SLOW_THRESHOLD_MS, |v| v.parse::<u64>().ok()) {
            self.sampling.slow_threshold_ms = ms;
        }
        self.normalized()
    }

    /// Degrade invalid values to defaults.
    pub fn normalized(mut self) -> Self {
        self.schema = self.schema.map(Schema::normalized);
        self.redaction = self.redaction.map(RedactionConfig::normalized);
        self.sampling = self.sampling.normalized();
        self
    }
}

fn read_override<F, T>(lookup: &F, var: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)?;
    match parse(raw.trim()) {
        Some(value) => Some(value),
        None => {
            let err = ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            };
            log::warn!("CONFIG_OVERRIDE_IGNORED {}", err);
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Deserialize an optional enum from a string, ignoring anything invalid.
pub(crate) fn lenient_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match s.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(reason) => {
                log::warn!("CONFIG_VALUE_IGNORED reason={:?}", reason);
                None
            }
        },
        Some(other) => {
            log::warn!("CONFIG_VALUE_IGNORED value={} expected=string", other);
            None
        }
    })
}

/// Like [`lenient_option`], falling back to `T::default()`.
pub(crate) fn lenient_or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String> + Default,
{
    Ok(lenient_option(deserializer)?.unwrap_or_default())
}
