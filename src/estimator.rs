//! Stratified-sum estimator and its confidence bound.
//!
//! Reducers contribute `(value, variance)` pairs per stratum each round. The
//! estimator accumulates them across rounds; per-reducer values for a stratum
//! are averaged into that stratum's contribution, and the stratified sum is
//! the sum of those contributions. The estimator variance sums each stratum's
//! mean reducer variance scaled by how many samples that stratum has seen.

use std::collections::HashMap;

use tracing::info;

use crate::types::{Estimate, ReduceResult};

/// Threshold below which a stratum's contribution counts as empty.
const EMPTY_CONTRIBUTION: f64 = 1e-3;

/// 95% two-sided normal quantile.
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Default)]
struct StratumAccumulator {
    values: Vec<f64>,
    variances: Vec<f64>,
    sampled: usize,
}

impl StratumAccumulator {
    fn mean_value(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn mean_variance(&self) -> f64 {
        if self.variances.is_empty() {
            return 0.0;
        }
        self.variances.iter().sum::<f64>() / self.variances.len() as f64
    }
}

/// Cross-round accumulator for the stratified-sum estimate.
#[derive(Debug, Clone, Default)]
pub struct StratifiedEstimator {
    strata: HashMap<String, StratumAccumulator>,
}

impl StratifiedEstimator {
    /// Create an empty estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one round's reducer outputs and sampled counts in.
    ///
    /// Returns the round's mean reducer variance per stratum, which feeds the
    /// next draw distribution (after flooring).
    pub fn absorb_round(
        &mut self,
        reduce_results: &HashMap<String, Vec<ReduceResult>>,
        sampled: &HashMap<String, usize>,
    ) -> HashMap<String, f64> {
        let mut round_variances = HashMap::with_capacity(reduce_results.len());
        for (stratum, results) in reduce_results {
            let acc = self.strata.entry(stratum.clone()).or_default();
            for r in results {
                acc.values.push(r.value);
                acc.variances.push(r.variance);
            }
            let round_var = if results.is_empty() {
                0.0
            } else {
                results.iter().map(|r| r.variance).sum::<f64>() / results.len() as f64
            };
            round_variances.insert(stratum.clone(), round_var);
        }
        for (stratum, &count) in sampled {
            self.strata.entry(stratum.clone()).or_default().sampled += count;
        }
        round_variances
    }

    /// True before any reducer output has been absorbed.
    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Cumulative sampled count for a stratum.
    pub fn sampled(&self, stratum: &str) -> usize {
        self.strata.get(stratum).map_or(0, |acc| acc.sampled)
    }

    /// Current stratified-sum estimate with its 95% half-width.
    ///
    /// Estimate: `sum_s mean_v(s)`. Variance: `sum_s mean_var(s)/sampled(s)`;
    /// a stratum that reducers mentioned but sampling never reached keeps its
    /// variance unscaled.
    pub fn estimate(&self) -> Estimate {
        let mut sum = 0.0;
        let mut variance = 0.0;
        for acc in self.strata.values() {
            sum += acc.mean_value();
            let var = acc.mean_variance();
            variance += if acc.sampled > 0 {
                var / acc.sampled as f64
            } else {
                var
            };
        }
        Estimate {
            value: sum,
            error: Z_95 * variance.sqrt(),
        }
    }

    /// Partition strata into (contributing, empty) by mean value.
    pub fn folder_report(&self) -> (Vec<String>, Vec<String>) {
        let mut contributing = Vec::new();
        let mut empty = Vec::new();
        for (stratum, acc) in &self.strata {
            if acc.mean_value().abs() < EMPTY_CONTRIBUTION {
                empty.push(stratum.clone());
            } else {
                contributing.push(stratum.clone());
            }
        }
        contributing.sort();
        empty.sort();
        (contributing, empty)
    }

    /// Log the estimate in the controller's result format.
    pub fn log_estimate(&self) -> Estimate {
        let estimate = self.estimate();
        info!(
            "RESULT ESTIMATION: sum(avg(Loc)) = {} +- {} (95% confidence)",
            estimate.value, estimate.error
        );
        estimate
    }
}
