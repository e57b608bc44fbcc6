//! Statistical model for per-stratum time and value statistics.
//!
//! This module provides the accumulators behind adaptive sampling:
//! - Two-pass mean/variance computation over raw timing samples
//! - 2-sigma outlier rejection against the pre-filter statistics
//! - Per-stratum statistics rebuilt from scratch every round
//! - The variance floor that keeps zero-variance strata sampleable

mod strata;
mod value_stats;

pub use strata::{RoundTimeSummary, StrataStats, StratumSnapshot, StratumStats, VAR_FLOOR};
pub use value_stats::{filter_outliers, ValueStats, OUTLIER_SIGMAS};
