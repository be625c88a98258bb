//! WideEvent Core - Canonical wide-event logging for request handlers
//!
//! One structured JSON record per request, built incrementally while the
//! request runs and emitted exactly once when it ends. The implementation
//! prioritizes:
//!
//! 1. **Safety** - Sensitive fields redacted before anything leaves the process
//! 2. **Correctness** - Finalize-once under racing completion signals
//! 3. **Cost** - Tail sampling keeps failures and drops most routine successes
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `record` - Record vocabulary, dot-path access, deep merge
//! - `pipeline` - Builder, request lifecycle, sinks, clock and id injection
//! - `security` - Redaction strategies and field-level redaction
//! - `validation` - Schema model and record validation
//! - `sampling` - Tail sampling rules and random sources
//! - `config` - Pipeline configuration from JSON and environment
//! - `logging` - Structured diagnostics with request context
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use wideevent_core::{
//!     EmitDecision, EventPipeline, MemorySink, PipelineConfig, RedactionConfig, RequestInit,
//!     ServiceMetadata,
//! };
//!
//! let sink = MemorySink::new();
//! let pipeline = Arc::new(EventPipeline::new(
//!     ServiceMetadata::new("checkout").with_version("1.4.2"),
//!     PipelineConfig::new()
//!         .with_redaction(RedactionConfig::default())
//!         .debug(true),
//!     Arc::new(sink.clone()),
//! ));
//!
//! let lifecycle = pipeline.begin(RequestInit::new("POST", "/orders"));
//! lifecycle.enrich(json!({"user": {"id": "u_1", "email": "jane@example.com"}}));
//! assert_eq!(lifecycle.complete(201), EmitDecision::Emitted);
//!
//! let record = &sink.records()[0];
//! assert_eq!(record["outcome"], json!("success"));
//! assert_eq!(record["user"]["email"], json!("j***@e***.com"));
//! ```

// Used by the exported logging macros.
#[doc(hidden)]
pub use log;

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod sampling;
pub mod security;
pub mod validation;

pub use config::PipelineConfig;
pub use error::{ConfigError, Result};
pub use logging::{init_logger, LogContext};
pub use pipeline::{
    Clock, EmitDecision, EventBuilder, EventPipeline, IdGenerator, Lifecycle, LifecycleState,
    ManualClock, MemorySink, RequestInit, ServiceMetadata, Sink, SystemClock,
    TraceContextProvider, UuidGenerator,
};
pub use record::{ErrorInfo, Outcome};
pub use sampling::{should_sample, FixedRandom, RandomSource, SamplingConfig, SamplingDecision};
pub use security::{apply_redaction, RedactionConfig, RedactionStrategy};
pub use validation::{
    validate, validate_redacted, FieldDefinition, FieldType, Schema, ValidationIssue,
    ValidationResult,
};
