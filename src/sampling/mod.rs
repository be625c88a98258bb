//! Tail sampling module.
//!
//! Decides whether a finalized, redacted record is kept:
//! - Default keep rules (server errors, timeouts, aborts, errors, slow requests)
//! - Probabilistic sampling of the remaining success path
//! - Optional custom decider replacing the defaults entirely

pub mod decision;
pub mod random;

pub use decision::*;
pub use random::*;
