//! Emission targets.
//!
//! A sink receives each kept record exactly once. Delivery past that point
//! (buffering, retries, transport) belongs to the sink.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Receiver of finalized, redacted, validated and sampled-in records.
pub trait Sink: Send + Sync {
    fn emit(&self, record: Value);
}

impl<F> Sink for F
where
    F: Fn(Value) + Send + Sync,
{
    fn emit(&self, record: Value) {
        self(record)
    }
}

/// Collects records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Value> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl Sink for MemorySink {
    fn emit(&self, record: Value) {
        self.records.lock().push(record);
    }
}
