//! Structured logging with request context.
//!
//! Provides logging macros and utilities that include the request id
//! in every diagnostic line for easy correlation.

pub mod structured;

pub use structured::*;

/// Install the process-wide logger.
///
/// Safe to call repeatedly; only the first call takes effect. Filtering
/// follows `RUST_LOG` on top of an `info` default.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
