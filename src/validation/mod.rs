//! Schema validation module.
//!
//! Checks finalized records against the built-in required fields and an
//! optional user schema:
//! - Required dot-paths
//! - Shallow type checks
//! - Unknown top-level key policy

pub mod schema;
pub mod validator;

pub use schema::*;
pub use validator::*;
