//! Wide event record model.
//!
//! The record is a `serde_json::Value` object. This module provides the
//! reserved field vocabulary plus pure dot-path and merge helpers that every
//! other stage builds on.

pub mod fields;
pub mod merge;
pub mod path;

pub use fields::*;
pub use merge::*;
pub use path::*;
