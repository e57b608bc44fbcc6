//! Shared plain-data types used across the controller.

use serde::{Deserialize, Serialize};

/// One per-record timing report pushed by a worker task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    /// Stratum the record belongs to (penultimate path segment).
    pub stratum: String,
    /// Identifier of the processed record (usually its file path).
    pub record_key: String,
    /// Processing time in microseconds.
    pub micros: u64,
}

impl TimeSample {
    /// Processing time in milliseconds.
    pub fn millis(&self) -> f64 {
        self.micros as f64 / 1_000.0
    }
}

/// Start/duration pair reported by a mapper or reducer task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskSpan {
    /// Task start, milliseconds since the epoch.
    pub start_ms: u64,
    /// Task duration in milliseconds.
    pub duration_ms: u64,
}

impl TaskSpan {
    /// Task end, milliseconds since the epoch.
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// A `(value, variance)` pair contributed for one stratum by one reducer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReduceResult {
    /// Reduced value contributed by the stratum.
    pub value: f64,
    /// Reducer-side variance of that value.
    pub variance: f64,
}

/// Point estimate with its 95%-confidence half-width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Stratified-sum point estimate.
    pub value: f64,
    /// 95% confidence half-width (`1.96 * sqrt(variance)`).
    pub error: f64,
}

impl Estimate {
    /// The estimator variance backing [`Estimate::error`].
    pub fn variance(&self) -> f64 {
        let se = self.error / 1.96;
        se * se
    }
}
