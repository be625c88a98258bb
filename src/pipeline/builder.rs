//! Mutable wide event for one request.
//!
//! Business logic enriches the record while the request runs. `finalize`
//! freezes it once; every later mutation is dropped with a warning so an
//! observability call can never destabilize request handling.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::logging::structured::LogContext;
use crate::pipeline::context::{Clock, RequestIdentity, RequestInit};
use crate::record::fields::*;
use crate::record::merge::{merge_deep, snapshot};
use crate::record::path::set_path;

/// Resolve the final outcome.
///
/// A marked error wins, then a forced abort, then the caller's hint, with
/// server-error status codes always counting as errors.
pub fn resolve_outcome(error_marked: bool, hint: Outcome, status_code: u16) -> Outcome {
    if error_marked {
        return Outcome::Error;
    }
    match hint {
        Outcome::Aborted => Outcome::Aborted,
        _ if status_code >= 500 => Outcome::Error,
        other => other,
    }
}

/// Accumulates context for a single request.
pub struct EventBuilder {
    record: Value,
    identity: RequestIdentity,
    /// Method, path, ip and user agent as seeded by the adapter.
    transport: Map<String, Value>,
    timestamp: String,
    started: Duration,
    clock: Arc<dyn Clock>,
    finalized: bool,
    error_marked: bool,
    /// An error arrived after the outcome was already `aborted`.
    abort_pinned: bool,
    ctx: LogContext,
}

impl EventBuilder {
    /// Seed a record with identity and transport fields.
    pub fn new(identity: RequestIdentity, init: &RequestInit, clock: Arc<dyn Clock>) -> Self {
        let ctx = identity.log_context();
        let timestamp = clock.timestamp();
        let started = clock.monotonic();

        let mut record = Value::Object(Map::new());
        match &init.initial_fields {
            Value::Null => {}
            fields @ Value::Object(_) => record = merge_deep(&record, fields),
            other => {
                log::warn!(
                    "{} INITIAL_FIELDS_IGNORED reason=not_an_object type={}",
                    ctx,
                    crate::validation::schema::FieldType::describe(other)
                );
            }
        }

        let mut transport = Map::new();
        transport.insert(METHOD.to_string(), Value::from(init.method.as_str()));
        transport.insert(PATH.to_string(), Value::from(init.path.as_str()));
        if let Some(ip) = &init.ip {
            transport.insert(IP.to_string(), Value::from(ip.as_str()));
        }
        if let Some(ua) = &init.user_agent {
            transport.insert(USER_AGENT.to_string(), Value::from(ua.as_str()));
        }

        let mut builder = Self {
            record,
            identity,
            transport,
            timestamp,
            started,
            clock,
            finalized: false,
            error_marked: false,
            abort_pinned: false,
            ctx,
        };
        builder.write_identity();

        log::debug!(
            "{} EVENT_STARTED method={} path={}",
            builder.ctx,
            init.method,
            init.path
        );
        builder
    }

    pub fn request_id(&self) -> &str {
        &self.identity.request_id
    }

    pub fn log_context(&self) -> &LogContext {
        &self.ctx
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Deep-merge an object into the record.
    pub fn enrich(&mut self, partial: &Value) {
        if self.reject_if_finalized("enrich") {
            return;
        }
        if !partial.is_object() {
            crate::log_warn!(self.ctx, "ENRICH_IGNORED", reason = "not_an_object");
            return;
        }
        self.record = merge_deep(&self.record, partial);
    }

    /// Write a single value at a dot-path.
    pub fn set(&mut self, path: &str, value: Value) {
        if self.reject_if_finalized("set") {
            return;
        }
        self.record = set_path(&self.record, path, value);
    }

    /// Copy of the current record.
    pub fn get(&self) -> Value {
        snapshot(&self.record)
    }

    /// Attach a structured error and flip the outcome to `error`.
    ///
    /// An outcome already set to `aborted` is left alone.
    pub fn mark_error(&mut self, err: impl Into<ErrorInfo>) {
        if self.reject_if_finalized("mark_error") {
            return;
        }
        let info: ErrorInfo = err.into();
        let aborted = self.record.get(OUTCOME).and_then(Value::as_str) == Some(Outcome::Aborted.as_str());

        crate::log_debug!(self.ctx, "ERROR_MARKED", kind = info.kind, aborted = aborted);

        if let Value::Object(obj) = &mut self.record {
            obj.insert(ERROR.to_string(), info.to_value());
            if aborted {
                self.abort_pinned = true;
            } else {
                obj.insert(OUTCOME.to_string(), Value::from(Outcome::Error.as_str()));
                self.error_marked = true;
            }
        }
    }

    /// Freeze the record and return a snapshot.
    ///
    /// Idempotent: later calls return the same snapshot and change nothing.
    pub fn finalize(&mut self, outcome_hint: Outcome, status_code: u16) -> Value {
        if self.finalized {
            return snapshot(&self.record);
        }

        let elapsed = self.clock.monotonic().saturating_sub(self.started);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let outcome = if self.abort_pinned {
            Outcome::Aborted
        } else {
            resolve_outcome(self.error_marked, outcome_hint, status_code)
        };

        self.write_identity();
        if let Value::Object(obj) = &mut self.record {
            obj.insert(STATUS_CODE.to_string(), Value::from(status_code));
            obj.insert(DURATION_MS.to_string(), Value::from(duration_ms));
            obj.insert(OUTCOME.to_string(), Value::from(outcome.as_str()));
        }
        self.finalized = true;

        crate::log_debug!(
            self.ctx,
            "EVENT_FINALIZED",
            status = status_code,
            outcome = outcome.as_str(),
            duration_ms = duration_ms
        );

        snapshot(&self.record)
    }

    /// Reserved identity and transport fields only the pipeline may write.
    fn write_identity(&mut self) {
        let Value::Object(obj) = &mut self.record else {
            return;
        };
        for (key, value) in &self.transport {
            obj.insert(key.clone(), value.clone());
        }
        let identity = &self.identity;
        obj.insert(TIMESTAMP.to_string(), Value::from(self.timestamp.as_str()));
        obj.insert(REQUEST_ID.to_string(), Value::from(identity.request_id.as_str()));
        if let Some(trace_id) = &identity.trace_id {
            obj.insert(TRACE_ID.to_string(), Value::from(trace_id.as_str()));
        }
        if let Some(span_id) = &identity.span_id {
            obj.insert(SPAN_ID.to_string(), Value::from(span_id.as_str()));
        }
        obj.insert(SERVICE.to_string(), Value::from(identity.service.name.as_str()));
        if let Some(version) = &identity.service.version {
            obj.insert(SERVICE_VERSION.to_string(), Value::from(version.as_str()));
        }
        if let Some(env) = &identity.service.environment {
            obj.insert(ENVIRONMENT.to_string(), Value::from(env.as_str()));
        }
    }

    fn reject_if_finalized(&self, op: &str) -> bool {
        if self.finalized {
            crate::log_warn!(self.ctx, "MUTATION_AFTER_FINALIZE", op = op);
        }
        self.finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::{ManualClock, ServiceMetadata};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 29, 12, 0, 0).unwrap(),
        ))
    }

    fn identity() -> RequestIdentity {
        RequestIdentity {
            request_id: "req-1".to_string(),
            trace_id: Some("trace-1".to_string()),
            span_id: None,
            service: ServiceMetadata::new("checkout").with_version("1.4.0"),
        }
    }

    fn builder(clock: Arc<ManualClock>) -> EventBuilder {
        let init = RequestInit::new("POST", "/orders")
            .with_ip("10.0.0.1")
            .with_fields(json!({"route": "/orders", "request_id": "spoofed"}));
        EventBuilder::new(identity(), &init, clock)
    }

    #[test]
    fn test_seeded_fields() {
        let b = builder(clock());
        let rec = b.get();
        assert_eq!(rec["method"], json!("POST"));
        assert_eq!(rec["path"], json!("/orders"));
        assert_eq!(rec["ip"], json!("10.0.0.1"));
        assert_eq!(rec["route"], json!("/orders"));
        assert_eq!(rec["request_id"], json!("req-1"));
        assert_eq!(rec["trace_id"], json!("trace-1"));
        assert_eq!(rec["service"], json!("checkout"));
        assert_eq!(rec["service_version"], json!("1.4.0"));
        assert_eq!(rec["timestamp"], json!("2026-01-29T12:00:00.000Z"));
        assert!(rec.get("status_code").is_none());
    }

    #[test]
    fn test_enrich_and_set() {
        let mut b = builder(clock());
        b.enrich(&json!({"user": {"id": "u1"}}));
        b.enrich(&json!({"user": {"plan": "pro"}, "cart": {"items": 3}}));
        b.set("cart.total", json!(99.5));
        let rec = b.get();
        assert_eq!(rec["user"], json!({"id": "u1", "plan": "pro"}));
        assert_eq!(rec["cart"], json!({"items": 3, "total": 99.5}));
    }

    #[test]
    fn test_non_object_enrich_ignored() {
        let mut b = builder(clock());
        let before = b.get();
        b.enrich(&json!(["not", "a", "map"]));
        assert_eq!(b.get(), before);
    }

    #[test]
    fn test_get_is_a_copy() {
        let mut b = builder(clock());
        let mut copy = b.get();
        copy["method"] = json!("DELETE");
        assert_eq!(b.get()["method"], json!("POST"));

        b.set("method", json!("PUT"));
        assert_eq!(copy["method"], json!("DELETE"));
    }

    #[test]
    fn test_finalize_computes_duration_and_outcome() {
        let clock = clock();
        let mut b = builder(clock.clone());
        clock.advance(Duration::from_millis(250));
        let rec = b.finalize(Outcome::Success, 201);
        assert_eq!(rec["status_code"], json!(201));
        assert_eq!(rec["duration_ms"], json!(250));
        assert_eq!(rec["outcome"], json!("success"));
        assert!(b.is_finalized());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let clock = clock();
        let mut b = builder(clock.clone());
        let first = b.finalize(Outcome::Success, 200);
        clock.advance(Duration::from_secs(5));
        let second = b.finalize(Outcome::Aborted, 499);
        assert_eq!(first, second);
    }

    #[test]
    fn test_mutations_after_finalize_are_dropped() {
        let mut b = builder(clock());
        let frozen = b.finalize(Outcome::Success, 200);
        b.enrich(&json!({"late": true}));
        b.set("later", json!(1));
        b.mark_error("too late");
        assert_eq!(b.get(), frozen);
    }

    #[test]
    fn test_identity_reasserted_at_finalize() {
        let mut b = builder(clock());
        b.enrich(&json!({"service": "impostor", "request_id": 7}));
        let rec = b.finalize(Outcome::Success, 200);
        assert_eq!(rec["service"], json!("checkout"));
        assert_eq!(rec["request_id"], json!("req-1"));
    }

    #[test]
    fn test_transport_fields_reasserted_at_finalize() {
        let mut b = builder(clock());
        b.enrich(&json!({"method": "DELETE", "path": {"x": 1}}));
        b.set("ip", json!("6.6.6.6"));
        let rec = b.finalize(Outcome::Success, 200);
        assert_eq!(rec["method"], json!("POST"));
        assert_eq!(rec["path"], json!("/orders"));
        assert_eq!(rec["ip"], json!("10.0.0.1"));
        assert!(rec.get("user_agent").is_none());
    }

    #[test]
    fn test_mark_error() {
        let mut b = builder(clock());
        b.mark_error(json!({"name": "DbTimeout", "message": "pool exhausted", "retriable": true}));
        let rec = b.get();
        assert_eq!(rec["outcome"], json!("error"));
        assert_eq!(
            rec["error"],
            json!({"kind": "DbTimeout", "message": "pool exhausted", "retriable": true})
        );

        let rec = b.finalize(Outcome::Success, 200);
        assert_eq!(rec["outcome"], json!("error"));
    }

    #[test]
    fn test_mark_error_keeps_aborted() {
        let mut b = builder(clock());
        b.set("outcome", json!("aborted"));
        b.mark_error("client went away");
        let rec = b.get();
        assert_eq!(rec["outcome"], json!("aborted"));
        assert_eq!(rec["error"]["message"], json!("client went away"));
    }

    #[test]
    fn test_error_after_abort_finalizes_as_aborted() {
        let mut b = builder(clock());
        b.set("outcome", json!("aborted"));
        b.mark_error("db down");
        let rec = b.finalize(Outcome::Success, 200);
        assert_eq!(rec["outcome"], json!("aborted"));
        assert_eq!(rec["error"]["message"], json!("db down"));
    }

    #[test]
    fn test_resolve_outcome_policy() {
        assert_eq!(resolve_outcome(true, Outcome::Aborted, 499), Outcome::Error);
        assert_eq!(resolve_outcome(false, Outcome::Aborted, 503), Outcome::Aborted);
        assert_eq!(resolve_outcome(false, Outcome::Success, 503), Outcome::Error);
        assert_eq!(resolve_outcome(false, Outcome::Success, 404), Outcome::Success);
        assert_eq!(resolve_outcome(false, Outcome::Error, 200), Outcome::Error);
    }
}
