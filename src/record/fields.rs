//! Reserved record fields, outcomes and the structured error shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TIMESTAMP: &str = "timestamp";
pub const REQUEST_ID: &str = "request_id";
pub const TRACE_ID: &str = "trace_id";
pub const SPAN_ID: &str = "span_id";
pub const SERVICE: &str = "service";
pub const SERVICE_VERSION: &str = "service_version";
pub const ENVIRONMENT: &str = "environment";
pub const METHOD: &str = "method";
pub const PATH: &str = "path";
pub const IP: &str = "ip";
pub const USER_AGENT: &str = "user_agent";
pub const STATUS_CODE: &str = "status_code";
pub const DURATION_MS: &str = "duration_ms";
pub const OUTCOME: &str = "outcome";
pub const ERROR: &str = "error";

/// Fields every finalized record must carry.
pub const BUILTIN_REQUIRED_FIELDS: &[&str] = &[
    TIMESTAMP,
    REQUEST_ID,
    SERVICE,
    METHOD,
    PATH,
    STATUS_CODE,
    DURATION_MS,
    OUTCOME,
];

/// Status code recorded when the client goes away before completion.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// Final classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
    Aborted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Aborted => "aborted",
        }
    }

    /// Outcome a plain status code implies.
    pub fn from_status(status_code: u16) -> Self {
        if status_code >= 500 {
            Outcome::Error
        } else {
            Outcome::Success
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error attached to a record by `mark_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    /// String or integer code, if the source carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriable: Option<bool>,
}

impl ErrorInfo {
    pub const DEFAULT_KIND: &'static str = "Error";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            code: None,
            retriable: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<Value>) -> Self {
        let code = code.into();
        if is_code_like(&code) {
            self.code = Some(code);
        }
        self
    }

    pub fn with_retriable(mut self, retriable: bool) -> Self {
        self.retriable = Some(retriable);
        self
    }

    /// Normalize any `std::error::Error` into the structured shape.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(Self::DEFAULT_KIND, err.to_string())
    }

    /// Normalize an error-like JSON value.
    ///
    /// Objects contribute `kind` (or `name`), `message`, `code` and
    /// `retriable`; fields of the wrong type are ignored. Any other value
    /// becomes the message.
    pub fn from_value(value: &Value) -> Self {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::String(s) => return Self::new(Self::DEFAULT_KIND, s.clone()),
            Value::Null => return Self::new(Self::DEFAULT_KIND, ""),
            other => return Self::new(Self::DEFAULT_KIND, other.to_string()),
        };

        let kind = obj
            .get("kind")
            .or_else(|| obj.get("name"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(Self::DEFAULT_KIND);

        let message = match obj.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Self {
            kind: kind.to_string(),
            message,
            code: obj.get("code").filter(|c| is_code_like(c)).cloned(),
            retriable: obj.get("retriable").and_then(|v| v.as_bool()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn is_code_like(value: &Value) -> bool {
    value.is_string() || value.is_i64() || value.is_u64()
}

impl From<&Value> for ErrorInfo {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Value> for ErrorInfo {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

impl From<&str> for ErrorInfo {
    fn from(message: &str) -> Self {
        Self::new(Self::DEFAULT_KIND, message)
    }
}

impl From<String> for ErrorInfo {
    fn from(message: String) -> Self {
        Self::new(Self::DEFAULT_KIND, message)
    }
}
