//! Error types.
//!
//! Only configuration loading can fail. Everything on the request path
//! degrades to a logged diagnostic instead of returning an error.

use thiserror::Error;

/// Errors raised while loading pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration document is not valid JSON or has the wrong shape.
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidEnv {
            var: "WIDEEVENT_STRICT".to_string(),
            value: "maybe".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value \"maybe\" for environment variable WIDEEVENT_STRICT"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let err: ConfigError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
