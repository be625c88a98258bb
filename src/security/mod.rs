//! Security module.
//!
//! Provides field-level redaction of sensitive data before a record leaves
//! the process.

pub mod redaction;
pub mod strategy;

pub use redaction::*;
pub use strategy::*;
