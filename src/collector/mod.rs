//! Thread-safe ingestion of worker statistics.
//!
//! Worker tasks push three kinds of data while a round runs: per-record
//! timings, per-stratum reducer outputs, and task start/duration spans. Any
//! number of workers may push concurrently; a single mutex serializes writes.
//! Between rounds the controller snapshots and clears everything in one lock
//! acquisition, so a late push can never leak into the wrong round's
//! aggregation.

mod server;

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::StatsIngestError;
use crate::types::{ReduceResult, TaskSpan, TimeSample};

pub use server::{StatsMessage, StatsServer, PORT_RANGE};

/// Round-scoped collections, all behind the collector's single mutex.
#[derive(Debug, Default)]
struct RoundScoped {
    time_samples: Vec<TimeSample>,
    reduce_results: HashMap<String, Vec<ReduceResult>>,
    mapper_times: Vec<TaskSpan>,
    reducer_times: Vec<TaskSpan>,
}

/// Everything one round pushed, snapshotted at harvest time.
#[derive(Debug, Default)]
pub struct RoundHarvest {
    /// Per-record timing reports.
    pub time_samples: Vec<TimeSample>,
    /// Per-stratum reducer `(value, variance)` contributions.
    pub reduce_results: HashMap<String, Vec<ReduceResult>>,
    /// Mapper start/duration spans.
    pub mapper_times: Vec<TaskSpan>,
    /// Reducer start/duration spans.
    pub reducer_times: Vec<TaskSpan>,
}

impl RoundHarvest {
    /// True when the round produced no data at all.
    pub fn is_empty(&self) -> bool {
        self.time_samples.is_empty()
            && self.reduce_results.is_empty()
            && self.mapper_times.is_empty()
            && self.reducer_times.is_empty()
    }

    /// Map-phase span: first mapper start to last mapper end, in ms.
    pub fn map_phase_ms(&self) -> Option<u64> {
        let first = self.mapper_times.iter().map(|t| t.start_ms).min()?;
        let last = self.mapper_times.iter().map(|t| t.end_ms()).max()?;
        Some(last.saturating_sub(first))
    }

    /// Mean reducer duration in ms, if any reducer reported.
    pub fn avg_reducer_ms(&self) -> Option<f64> {
        if self.reducer_times.is_empty() {
            return None;
        }
        let total: u64 = self.reducer_times.iter().map(|t| t.duration_ms).sum();
        Some(total as f64 / self.reducer_times.len() as f64)
    }
}

/// Shared sink for worker statistics.
///
/// Ingestion endpoints are callable from any thread. The controller is the
/// only reader and drains between rounds via [`StatsCollector::drain_round`].
#[derive(Debug, Default)]
pub struct StatsCollector {
    round: Mutex<RoundScoped>,
}

impl StatsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a batch of per-record timings from one worker task.
    ///
    /// Empty batches are dropped with a warning, matching the contract that
    /// a worker reporting nothing does not fail the round.
    pub fn add_times(&self, samples: Vec<TimeSample>) {
        if samples.is_empty() {
            warn!("dropping empty timing batch");
            return;
        }
        self.round.lock().time_samples.extend(samples);
    }

    /// Ingest one per-record timing.
    pub fn add_time(&self, sample: TimeSample) {
        self.round.lock().time_samples.push(sample);
    }

    /// Ingest reducer outputs: parallel lists of strata, values, variances.
    ///
    /// Returns the ingest error (already logged) if the push was unusable.
    pub fn add_reduce(
        &self,
        strata: Vec<String>,
        values: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<(), StatsIngestError> {
        if strata.is_empty() {
            let err = StatsIngestError::Empty;
            warn!(%err, "dropping reduce push");
            return Err(err);
        }
        if strata.len() != values.len() || strata.len() != variances.len() {
            let err = StatsIngestError::LengthMismatch {
                strata: strata.len(),
                values: values.len(),
                variances: variances.len(),
            };
            warn!(%err, "dropping reduce push");
            return Err(err);
        }

        let mut round = self.round.lock();
        for ((stratum, value), variance) in strata.into_iter().zip(values).zip(variances) {
            round
                .reduce_results
                .entry(stratum)
                .or_default()
                .push(ReduceResult { value, variance });
        }
        Ok(())
    }

    /// Ingest a mapper start/duration span.
    pub fn add_mapper_time(&self, span: TaskSpan) {
        self.round.lock().mapper_times.push(span);
    }

    /// Ingest a reducer start/duration span.
    pub fn add_reducer_time(&self, span: TaskSpan) {
        self.round.lock().reducer_times.push(span);
    }

    /// Snapshot and clear every round-scoped collection.
    ///
    /// Single lock acquisition: pushes that arrive after the drain belong to
    /// the next round.
    pub fn drain_round(&self) -> RoundHarvest {
        let mut round = self.round.lock();
        RoundHarvest {
            time_samples: std::mem::take(&mut round.time_samples),
            reduce_results: std::mem::take(&mut round.reduce_results),
            mapper_times: std::mem::take(&mut round.mapper_times),
            reducer_times: std::mem::take(&mut round.reducer_times),
        }
    }

    /// Number of timing reports currently buffered (for diagnostics).
    pub fn pending_times(&self) -> usize {
        self.round.lock().time_samples.len()
    }
}
