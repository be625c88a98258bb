//! Pipeline context management.
//!
//! Service identity, per-request seed data, and the injected clock, id and
//! trace-context collaborators.

use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Identity of the emitting service, shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub name: String,
    pub version: Option<String>,
    pub environment: Option<String>,
}

impl ServiceMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            environment: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_environment(mut self, environment: &str) -> Self {
        self.environment = Some(environment.to_string());
        self
    }
}

/// Seed data the adapter extracts when a request starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInit {
    /// Generated when absent.
    pub request_id: Option<String>,
    /// Taken from the trace-context provider when absent.
    pub trace_id: Option<String>,
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Extra fields merged into the record at construction.
    pub initial_fields: Value,
    /// Always emit this request, bypassing tail sampling.
    pub debug: bool,
}

impl RequestInit {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            request_id: None,
            trace_id: None,
            method: method.to_string(),
            path: path.to_string(),
            ip: None,
            user_agent: None,
            initial_fields: Value::Null,
            debug: false,
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_trace_id(mut self, trace_id: &str) -> Self {
        self.trace_id = Some(trace_id.to_string());
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.initial_fields = fields;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Resolved identity of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub request_id: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub service: ServiceMetadata,
}

impl RequestIdentity {
    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.request_id).with_service(&self.service.name)
    }
}

/// Time source. `monotonic` drives durations, `now_utc` the timestamp.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin. Never goes backwards.
    fn monotonic(&self) -> Duration;
    fn now_utc(&self) -> DateTime<Utc>;

    fn timestamp(&self) -> String {
        self.now_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Wall clock plus an `Instant` anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Duration, DateTime<Utc>)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new((Duration::ZERO, start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.0 += by;
        if let Ok(delta) = chrono::Duration::from_std(by) {
            state.1 += delta;
        }
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.state.lock().0
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.state.lock().1
    }
}

/// Source of request identifiers.
pub trait IdGenerator: Send + Sync {
    fn request_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Optional bridge to an ambient tracing system.
///
/// When installed, it supplies trace and span ids for requests that arrive
/// without one. Its absence is a normal state.
pub trait TraceContextProvider: Send + Sync {
    fn current_trace_id(&self) -> Option<String>;

    fn current_span_id(&self) -> Option<String> {
        None
    }
}
