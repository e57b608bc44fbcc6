//! Next-round sizing from the previous round's measurements.
//!
//! After a round finishes, the planner splits its wall time into map work
//! (`avg per-record time * records / parallel slots`) and everything else:
//! shuffle, reduce, and launch overhead. The overhead is assumed stable
//! between rounds, so the remaining deadline minus the overhead is the time
//! actually available for map work, from which the next sample size follows.

use tracing::info;

use crate::sampling::SampleBudget;

/// What the controller measured about one completed round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundMeasurement {
    /// Wall time of the whole loop iteration, in ms.
    pub wall_time_ms: f64,
    /// Mean per-record processing time reported by workers, in ms
    /// (post outlier filter).
    pub avg_record_ms: f64,
    /// Number of records processed (timing reports received, pre-filter).
    pub records: usize,
}

/// The sampler budget and size prediction for the next round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundPlan {
    /// Predicted sample count the remaining time can afford.
    pub next_count: i64,
    /// Budget handed to the sampler.
    pub budget: SampleBudget,
    /// Measured non-map overhead of the previous round, in ms.
    pub extra_cost_ms: f64,
}

/// Plans round sizes against the deadline.
#[derive(Debug, Clone, Copy)]
pub struct RoundPlanner {
    parallel_slots: usize,
    sample_time_pctg: f64,
}

impl RoundPlanner {
    /// Create a planner for a cluster of `parallel_slots` map slots.
    pub fn new(parallel_slots: usize, sample_time_pctg: f64) -> Self {
        Self {
            parallel_slots,
            sample_time_pctg,
        }
    }

    /// Non-map overhead of a round: wall time minus predicted map time.
    ///
    /// Zero when the round produced no timing data, and never negative.
    pub fn extra_cost_ms(&self, m: &RoundMeasurement) -> f64 {
        if m.avg_record_ms <= 0.0 {
            return 0.0;
        }
        let map_ms = m.avg_record_ms * m.records as f64 / self.parallel_slots as f64;
        (m.wall_time_ms - map_ms).max(0.0)
    }

    /// Sample count the remaining time can afford after overhead.
    ///
    /// `floor((remaining - extra) / avg_record * slots)`. A round with no
    /// timing data predicts 1: not enough information to stop yet.
    pub fn next_count(&self, remaining_ms: f64, extra_cost_ms: f64, avg_record_ms: f64) -> i64 {
        if avg_record_ms <= 0.0 {
            return 1;
        }
        ((remaining_ms - extra_cost_ms) / avg_record_ms * self.parallel_slots as f64).floor()
            as i64
    }

    /// Plan the round after `measurement`, given the remaining deadline.
    ///
    /// Round 2 gets only `sample_time_pctg` of the post-overhead remaining
    /// time (it exists to measure value variance cheaply); later rounds get
    /// all of it. Returns `None` when the prediction says no further round
    /// fits, which ends the controller loop.
    pub fn plan(
        &self,
        next_round: usize,
        remaining_ms: f64,
        measurement: &RoundMeasurement,
    ) -> Option<RoundPlan> {
        let extra_cost_ms = self.extra_cost_ms(measurement);
        let next_count = self.next_count(remaining_ms, extra_cost_ms, measurement.avg_record_ms);
        info!(
            avg_record_ms = measurement.avg_record_ms,
            records = measurement.records,
            extra_cost_ms,
            next_count,
            "round plan"
        );
        if next_count <= 0 {
            return None;
        }

        let budget_ms = if next_round == 2 {
            self.sample_time_pctg * remaining_ms - extra_cost_ms
        } else {
            remaining_ms - extra_cost_ms
        };
        if budget_ms <= 0.0 {
            return None;
        }

        Some(RoundPlan {
            next_count,
            budget: SampleBudget::TimeMs(budget_ms),
            extra_cost_ms,
        })
    }
}
