//! Request lifecycle orchestration.
//!
//! One `Lifecycle` per request. Completion and abort signals race through
//! the same guarded transition; exactly one of them runs:
//! 1. Builder finalize
//! 2. Redaction
//! 3. Validation (strict mode can block emission)
//! 4. Tail sampling (skipped in debug mode)
//! 5. Sink hand-off

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::logging::structured::LogContext;
use crate::pipeline::builder::EventBuilder;
use crate::pipeline::context::{
    Clock, IdGenerator, RequestIdentity, RequestInit, ServiceMetadata, SystemClock,
    TraceContextProvider, UuidGenerator,
};
use crate::pipeline::sink::Sink;
use crate::record::fields::{ErrorInfo, Outcome, STATUS_CLIENT_CLOSED_REQUEST};
use crate::sampling::decision::evaluate;
use crate::sampling::random::{RandomSource, ThreadRandom};
use crate::security::redaction::redact_record;
use crate::validation::validator::{validate_redacted, ValidationIssue};

const STATE_OPEN: u8 = 0;
const STATE_FINALIZING: u8 = 1;
const STATE_FINALIZED: u8 = 2;

/// Moves the state to `Finalized` even if a stage or the sink unwinds.
struct FinalizedOnDrop<'a>(&'a AtomicU8);

impl Drop for FinalizedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(STATE_FINALIZED, Ordering::Release);
    }
}

/// Finalize-once state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Open,
    Finalizing,
    Finalized,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_OPEN => LifecycleState::Open,
            STATE_FINALIZING => LifecycleState::Finalizing,
            _ => LifecycleState::Finalized,
        }
    }
}

/// What a completion signal led to.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitDecision {
    /// The sink received the record.
    Emitted,
    /// Tail sampling dropped the record.
    SampledOut,
    /// Strict validation failed; nothing was emitted.
    Rejected { errors: Vec<ValidationIssue> },
    /// Another signal already finalized this lifecycle.
    AlreadyFinalized,
}

/// Process-wide factory for request lifecycles.
///
/// Holds configuration and the injected collaborators shared by every
/// request.
pub struct EventPipeline {
    service: ServiceMetadata,
    config: PipelineConfig,
    sink: Arc<dyn Sink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    rng: Arc<dyn RandomSource>,
    tracer: Option<Arc<dyn TraceContextProvider>>,
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("service", &self.service)
            .field("config", &self.config)
            .field("tracer", &self.tracer.as_ref().map(|_| "<provider>"))
            .finish()
    }
}

impl EventPipeline {
    pub fn new(service: ServiceMetadata, config: PipelineConfig, sink: Arc<dyn Sink>) -> Self {
        Self {
            service,
            config: config.normalized(),
            sink,
            clock: Arc::new(SystemClock::new()),
            ids: Arc::new(UuidGenerator),
            rng: Arc::new(ThreadRandom),
            tracer: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_trace_provider(mut self, tracer: Arc<dyn TraceContextProvider>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service(&self) -> &ServiceMetadata {
        &self.service
    }

    /// Start the lifecycle of one request.
    pub fn begin(self: &Arc<Self>, init: RequestInit) -> Lifecycle {
        let request_id = init
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.ids.request_id());

        let (trace_id, span_id) = match (&init.trace_id, &self.tracer) {
            (Some(trace_id), _) => (Some(trace_id.clone()), None),
            (None, Some(tracer)) => (tracer.current_trace_id(), tracer.current_span_id()),
            (None, None) => (None, None),
        };

        let identity = RequestIdentity {
            request_id,
            trace_id,
            span_id,
            service: self.service.clone(),
        };
        let ctx = identity.log_context();
        let builder = EventBuilder::new(identity, &init, self.clock.clone());

        Lifecycle {
            pipeline: Arc::clone(self),
            builder: Mutex::new(builder),
            state: AtomicU8::new(STATE_OPEN),
            emitted: AtomicBool::new(false),
            debug: init.debug,
            ctx,
        }
    }
}

/// Wide event lifecycle of a single request.
///
/// Enrichment is single-writer; the completion signals (`complete`,
/// `abort`, `finalize`) may race from any thread.
pub struct Lifecycle {
    pipeline: Arc<EventPipeline>,
    builder: Mutex<EventBuilder>,
    state: AtomicU8,
    emitted: AtomicBool,
    debug: bool,
    ctx: LogContext,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("request_id", &self.ctx.request_id)
            .field("state", &self.state())
            .field("emitted", &self.was_emitted())
            .finish()
    }
}

impl Lifecycle {
    pub fn request_id(&self) -> &str {
        &self.ctx.request_id
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finalized(&self) -> bool {
        self.state() != LifecycleState::Open
    }

    pub fn was_emitted(&self) -> bool {
        self.emitted.load(Ordering::Acquire)
    }

    pub fn enrich(&self, partial: Value) {
        self.builder.lock().enrich(&partial);
    }

    pub fn set(&self, path: &str, value: impl Into<Value>) {
        self.builder.lock().set(path, value.into());
    }

    pub fn mark_error(&self, err: impl Into<ErrorInfo>) {
        self.builder.lock().mark_error(err);
    }

    /// Copy of the current record.
    pub fn get(&self) -> Value {
        self.builder.lock().get()
    }

    /// Normal completion with the response status code.
    pub fn complete(&self, status_code: u16) -> EmitDecision {
        self.finalize(Outcome::from_status(status_code), status_code)
    }

    /// Client went away before the response finished.
    pub fn abort(&self) -> EmitDecision {
        self.finalize(Outcome::Aborted, STATUS_CLIENT_CLOSED_REQUEST)
    }

    /// Guarded transition out of `Open`. Only the first caller does work.
    pub fn finalize(&self, outcome_hint: Outcome, status_code: u16) -> EmitDecision {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_FINALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::log_debug!(
                self.ctx,
                "FINALIZE_IGNORED",
                outcome = outcome_hint.as_str(),
                status = status_code
            );
            return EmitDecision::AlreadyFinalized;
        }

        let _guard = FinalizedOnDrop(&self.state);
        self.run_finalize(outcome_hint, status_code)
    }

    fn run_finalize(&self, outcome_hint: Outcome, status_code: u16) -> EmitDecision {
        let config = &self.pipeline.config;

        // [1] FINALIZE
        let snapshot = self.builder.lock().finalize(outcome_hint, status_code);

        // [2] REDACTION
        let (redacted, report) = redact_record(
            &snapshot,
            config.redaction.as_ref(),
            config.schema.as_ref(),
            &self.ctx,
        );

        // [3] VALIDATION
        let rewritten: Vec<&str> = report.redacted.iter().map(|(path, _)| path.as_str()).collect();
        let validation =
            validate_redacted(&redacted, config.schema.as_ref(), config.strict, &rewritten);
        validation.log(&self.ctx);
        if config.strict && !validation.valid {
            crate::log_error!(
                self.ctx,
                "EMIT_REJECTED",
                reason = "strict_validation",
                errors = validation.errors.len()
            );
            return EmitDecision::Rejected {
                errors: validation.errors,
            };
        }

        // [4] TAIL SAMPLING
        if config.debug || self.debug {
            crate::log_debug!(self.ctx, "SAMPLING_BYPASSED", reason = "debug");
        } else {
            let decision = evaluate(&redacted, &config.sampling, self.pipeline.rng.as_ref());
            crate::log_debug!(
                self.ctx,
                "SAMPLING_DECISION",
                keep = decision.is_keep(),
                reason = decision.reason()
            );
            if !decision.is_keep() {
                return EmitDecision::SampledOut;
            }
        }

        // [5] EMIT
        self.pipeline.sink.emit(redacted);
        self.emitted.store(true, Ordering::Release);
        crate::log_debug!(self.ctx, "EVENT_EMITTED", status = status_code);

        EmitDecision::Emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::ManualClock;
    use crate::pipeline::sink::MemorySink;
    use crate::sampling::decision::SamplingConfig;
    use crate::sampling::random::FixedRandom;
    use crate::security::redaction::RedactionConfig;
    use crate::security::strategy::RedactionStrategy;
    use crate::validation::schema::Schema;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;

    struct StaticTracer;

    impl TraceContextProvider for StaticTracer {
        fn current_trace_id(&self) -> Option<String> {
            Some("4bf92f3577b34da6a3ce929d0e0e4736".to_string())
        }

        fn current_span_id(&self) -> Option<String> {
            Some("00f067aa0ba902b7".to_string())
        }
    }

    fn pipeline(config: PipelineConfig, sink: &MemorySink) -> Arc<EventPipeline> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 29, 12, 0, 0).unwrap(),
        ));
        Arc::new(
            EventPipeline::new(
                ServiceMetadata::new("checkout"),
                config,
                Arc::new(sink.clone()),
            )
            .with_clock(clock)
            .with_random(Arc::new(FixedRandom(0.99))),
        )
    }

    fn keep_all() -> PipelineConfig {
        PipelineConfig::new().with_sampling(SamplingConfig::default().with_rate(1.0))
    }

    #[test]
    fn test_complete_emits_once() {
        let sink = MemorySink::new();
        let lc = pipeline(keep_all(), &sink).begin(RequestInit::new("GET", "/health"));

        assert_eq!(lc.state(), LifecycleState::Open);
        assert_eq!(lc.complete(200), EmitDecision::Emitted);
        assert_eq!(lc.complete(200), EmitDecision::AlreadyFinalized);
        assert_eq!(lc.abort(), EmitDecision::AlreadyFinalized);

        assert_eq!(lc.state(), LifecycleState::Finalized);
        assert!(lc.was_emitted());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0]["outcome"], json!("success"));
    }

    #[test]
    fn test_abort_then_complete() {
        let sink = MemorySink::new();
        let lc = pipeline(PipelineConfig::new(), &sink).begin(RequestInit::new("GET", "/slow"));

        assert_eq!(lc.abort(), EmitDecision::Emitted);
        assert_eq!(lc.complete(200), EmitDecision::AlreadyFinalized);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["outcome"], json!("aborted"));
        assert_eq!(records[0]["status_code"], json!(499));
    }

    #[test]
    fn test_success_sampled_out() {
        let sink = MemorySink::new();
        let config = PipelineConfig::new().with_sampling(SamplingConfig::default().with_rate(0.0));
        let lc = pipeline(config, &sink).begin(RequestInit::new("GET", "/"));

        assert_eq!(lc.complete(200), EmitDecision::SampledOut);
        assert!(!lc.was_emitted());
        assert!(lc.is_finalized());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_debug_bypasses_sampling() {
        let sink = MemorySink::new();
        let config = PipelineConfig::new().with_sampling(SamplingConfig::custom(|_| false));
        let p = pipeline(config, &sink);

        let lc = p.begin(RequestInit::new("GET", "/").with_debug(true));
        assert_eq!(lc.complete(200), EmitDecision::Emitted);

        let lc = p.begin(RequestInit::new("GET", "/"));
        assert_eq!(lc.complete(200), EmitDecision::SampledOut);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_strict_validation_blocks_emission() {
        let sink = MemorySink::new();
        let config = keep_all()
            .with_schema(Schema::new().with_required("user.id"))
            .strict(true);
        let lc = pipeline(config, &sink).begin(RequestInit::new("POST", "/orders"));

        match lc.complete(201) {
            EmitDecision::Rejected { errors } => assert_eq!(errors.len(), 1),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(lc.state(), LifecycleState::Finalized);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_lenient_validation_still_emits() {
        let sink = MemorySink::new();
        let config = keep_all().with_schema(Schema::new().with_required("user.id"));
        let lc = pipeline(config, &sink).begin(RequestInit::new("POST", "/orders"));
        assert_eq!(lc.complete(201), EmitDecision::Emitted);
    }

    #[test]
    fn test_redacted_record_reaches_sink() {
        let sink = MemorySink::new();
        let config = keep_all().with_redaction(
            RedactionConfig::new(RedactionStrategy::Mask).with_fields(["user.email"]),
        );
        let lc = pipeline(config, &sink).begin(RequestInit::new("POST", "/signup"));
        lc.enrich(json!({"user": {"email": "a@b.com"}}));

        assert_eq!(lc.complete(200), EmitDecision::Emitted);
        assert_eq!(sink.records()[0]["user"]["email"], json!("a***@b***.com"));
        // The live record keeps the raw value.
        assert_eq!(lc.get()["user"]["email"], json!("a@b.com"));
    }

    #[test]
    fn test_request_and_trace_ids() {
        let sink = MemorySink::new();
        let p = Arc::new(
            EventPipeline::new(
                ServiceMetadata::new("checkout"),
                keep_all(),
                Arc::new(sink.clone()),
            )
            .with_trace_provider(Arc::new(StaticTracer)),
        );

        let generated = p.begin(RequestInit::new("GET", "/"));
        assert_eq!(generated.request_id().len(), 36);
        let rec = generated.get();
        assert_eq!(rec["trace_id"], json!("4bf92f3577b34da6a3ce929d0e0e4736"));
        assert_eq!(rec["span_id"], json!("00f067aa0ba902b7"));

        let explicit = p.begin(
            RequestInit::new("GET", "/")
                .with_request_id("req-42")
                .with_trace_id("abc"),
        );
        assert_eq!(explicit.request_id(), "req-42");
        assert_eq!(explicit.get()["trace_id"], json!("abc"));
        assert!(explicit.get().get("span_id").is_none());
    }

    #[test]
    fn test_no_trace_provider_leaves_trace_id_absent() {
        let sink = MemorySink::new();
        let lc = pipeline(keep_all(), &sink).begin(RequestInit::new("GET", "/"));
        assert!(lc.get().get("trace_id").is_none());
        assert_eq!(lc.complete(200), EmitDecision::Emitted);
    }

    #[test]
    fn test_duration_uses_injected_clock() {
        let sink = MemorySink::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 29, 12, 0, 0).unwrap(),
        ));
        let p = Arc::new(
            EventPipeline::new(
                ServiceMetadata::new("checkout"),
                PipelineConfig::new().with_sampling(SamplingConfig::default().with_rate(0.0)),
                Arc::new(sink.clone()),
            )
            .with_clock(clock.clone())
            .with_random(Arc::new(FixedRandom(0.99))),
        );

        let lc = p.begin(RequestInit::new("GET", "/report"));
        clock.advance(Duration::from_millis(2500));
        // Slow requests are kept even at a zero success rate.
        assert_eq!(lc.complete(200), EmitDecision::Emitted);
        assert_eq!(sink.records()[0]["duration_ms"], json!(2500));
    }

    #[test]
    fn test_panicking_sink_still_finalizes() {
        let p = Arc::new(
            EventPipeline::new(
                ServiceMetadata::new("checkout"),
                PipelineConfig::new().debug(true),
                Arc::new(|_record: Value| panic!("sink down")),
            ),
        );
        let lc = p.begin(RequestInit::new("GET", "/"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| lc.complete(200)));
        assert!(result.is_err());
        assert_eq!(lc.state(), LifecycleState::Finalized);
        assert_eq!(lc.abort(), EmitDecision::AlreadyFinalized);
    }

    #[test]
    fn test_racing_signals_emit_at_most_once() {
        for _ in 0..50 {
            let sink = MemorySink::new();
            let lc = Arc::new(pipeline(keep_all(), &sink).begin(RequestInit::new("GET", "/")));

            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let lc = Arc::clone(&lc);
                    std::thread::spawn(move || {
                        if i % 2 == 0 {
                            lc.complete(200)
                        } else {
                            lc.abort()
                        }
                    })
                })
                .collect();

            let decisions: Vec<EmitDecision> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            let emitted = decisions
                .iter()
                .filter(|d| **d == EmitDecision::Emitted)
                .count();

            assert_eq!(emitted, 1);
            assert_eq!(sink.len(), 1);
        }
    }
}
