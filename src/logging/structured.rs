//! Structured logging utilities.
//!
//! Provides context-aware logging with request_id (and service, when known)
//! included in every log message.

use std::fmt;

/// Logging context for a single request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub request_id: String,
    pub service: Option<String>,
}

impl LogContext {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            service: None,
        }
    }

    pub fn with_service(&self, service: &str) -> Self {
        Self {
            request_id: self.request_id.clone(),
            service: Some(service.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(svc) => write!(f, "[request={}] [service={}]", self.request_id, svc),
            None => write!(f, "[request={}]", self.request_id),
        }
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr) => {
        $crate::log::info!("{} {}", $ctx, $event)
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $crate::log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        )
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr) => {
        $crate::log::warn!("{} {}", $ctx, $event)
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $crate::log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        )
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr) => {
        $crate::log::error!("{} {}", $ctx, $event)
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $crate::log::error!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        )
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr) => {
        $crate::log::debug!("{} {}", $ctx, $event)
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $crate::log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        )
    };
}
