//! Per-stratum statistics, rebuilt from raw samples every round.

use std::collections::HashMap;

use tracing::info;

use crate::types::TimeSample;

use super::{filter_outliers, ValueStats};

/// Variances below this are considered degenerate and floored.
pub const VAR_FLOOR: f64 = 1e-4;

/// Substitute variance when every stratum is degenerate.
const VAR_FALLBACK: f64 = 0.01;

/// Statistics for one stratum in one round.
#[derive(Debug, Clone, Default)]
pub struct StratumStats {
    /// Post-filter per-record time statistics, in milliseconds.
    pub time: ValueStats,
    /// Variance of the reduced value contributed by this stratum in the most
    /// recent round. Supplied by the estimator, then floored.
    pub var_v: f64,
}

/// Compact per-stratum view handed to the sampler as the draw distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StratumSnapshot {
    /// Timing samples accepted by the outlier filter this round.
    pub count: usize,
    /// Mean per-record time in milliseconds.
    pub avg_time_ms: f64,
    /// Floored reduced-value variance.
    pub var: f64,
}

/// Round-level timing aggregates needed by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundTimeSummary {
    /// Mean per-record time across all accepted samples, in milliseconds.
    pub avg_record_ms: f64,
    /// Total timing reports received, before outlier filtering.
    pub reports: usize,
    /// Samples accepted by the outlier filter.
    pub accepted: usize,
    /// Samples rejected by the outlier filter.
    pub rejected: usize,
}

/// Per-stratum statistics for the latest completed round.
///
/// Rebuilt from scratch each round so the adaptive weights track the most
/// recent measurements instead of a long-running average.
#[derive(Debug, Clone, Default)]
pub struct StrataStats {
    strata: HashMap<String, StratumStats>,
    summary: RoundTimeSummary,
}

impl StrataStats {
    /// Build per-stratum time statistics from one round's raw samples.
    ///
    /// Runs the two-pass mean/variance computation per stratum, then a second
    /// pass that drops samples outside `avg +- 2*sqrt(var)` of the pre-filter
    /// statistics. Only the post-filter statistics are kept.
    pub fn from_round(samples: &[TimeSample]) -> Self {
        let mut by_stratum: HashMap<String, Vec<f64>> = HashMap::new();
        for sample in samples {
            by_stratum
                .entry(sample.stratum.clone())
                .or_default()
                .push(sample.millis());
        }

        let mut strata = HashMap::with_capacity(by_stratum.len());
        let mut accepted_sum = 0.0;
        let mut accepted_count = 0usize;
        let mut rejected_total = 0usize;

        for (stratum, values) in by_stratum {
            let prefilter = ValueStats::from_samples(&values);
            let (accepted, rejected) = filter_outliers(&values, &prefilter);
            let time = ValueStats::from_samples(&accepted);

            accepted_sum += accepted.iter().sum::<f64>();
            accepted_count += accepted.len();
            rejected_total += rejected;

            strata.insert(
                stratum,
                StratumStats {
                    time,
                    var_v: 0.0,
                },
            );
        }

        let avg_record_ms = if accepted_count > 0 {
            accepted_sum / accepted_count as f64
        } else {
            0.0
        };

        Self {
            strata,
            summary: RoundTimeSummary {
                avg_record_ms,
                reports: samples.len(),
                accepted: accepted_count,
                rejected: rejected_total,
            },
        }
    }

    /// Inject the per-stratum reduced-value variances computed by the
    /// estimator for this round, then apply the variance floor.
    ///
    /// Floor rule: a stratum with `var_v < 1e-4` would be (nearly)
    /// zero-weighted by the next proportional or Metropolis-Hastings draw, so
    /// it receives the cross-stratum mean of the positive variances; if that
    /// mean is itself below the floor, a fixed `0.01`.
    pub fn set_reduce_variances(&mut self, variances: &HashMap<String, f64>) {
        for (stratum, &var) in variances {
            if let Some(stats) = self.strata.get_mut(stratum) {
                stats.var_v = var;
            }
        }

        let positive: Vec<f64> = self
            .strata
            .values()
            .map(|s| s.var_v)
            .filter(|&v| v > 0.0)
            .collect();
        let mut substitute = if positive.is_empty() {
            0.0
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        };
        if substitute < VAR_FLOOR {
            substitute = VAR_FALLBACK;
        }

        for stats in self.strata.values_mut() {
            if stats.var_v < VAR_FLOOR {
                stats.var_v = substitute;
            }
        }
    }

    /// Stats for one stratum, if it reported this round.
    pub fn get(&self, stratum: &str) -> Option<&StratumStats> {
        self.strata.get(stratum)
    }

    /// Number of strata that reported this round.
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    /// True when no stratum reported this round.
    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Round-level timing aggregates.
    pub fn summary(&self) -> RoundTimeSummary {
        self.summary
    }

    /// The draw distribution for the next round's sampler.
    pub fn snapshot(&self) -> HashMap<String, StratumSnapshot> {
        self.strata
            .iter()
            .map(|(stratum, stats)| {
                (
                    stratum.clone(),
                    StratumSnapshot {
                        count: stats.time.count(),
                        avg_time_ms: stats.time.avg(),
                        var: stats.var_v,
                    },
                )
            })
            .collect()
    }

    /// Log the per-stratum summary the way round harvests are reported.
    pub fn log(&self) {
        let mut keys: Vec<&String> = self.strata.keys().collect();
        keys.sort();
        for key in keys {
            let stats = &self.strata[key];
            info!(
                stratum = %key,
                avg_time_ms = stats.time.avg(),
                var_value = stats.var_v,
                count = stats.time.count(),
                "stratum statistics"
            );
        }
    }
}
