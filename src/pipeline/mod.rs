//! Pipeline orchestration module.
//!
//! Request lifecycle that coordinates:
//! - Event building (enrich, set, mark_error)
//! - Finalize-once state machine
//! - Redaction
//! - Schema validation
//! - Tail sampling
//! - Emission to the sink

pub mod builder;
pub mod context;
pub mod lifecycle;
pub mod sink;

pub use builder::*;
pub use context::*;
pub use lifecycle::*;
pub use sink::*;
