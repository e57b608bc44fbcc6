//! Stratified sample selection over the input catalog.
//!
//! Three strategies share one draw loop shape: pull uniform random files from
//! the catalog and accept or reject each against the strategy's state.
//!
//! 1. **Uniform-per-stratum** (first round): every discovered stratum gets
//!    variance 1, which collapses the proportional quotas to an equal count
//!    per stratum.
//! 2. **Proportional-to-sigma**: per-stratum quotas proportional to
//!    `sqrt(var)` of the reduced value.
//! 3. **Metropolis-Hastings** (default from round 2): a walker over strata
//!    whose stationary distribution tracks per-stratum variance, minimizing
//!    the variance of the stratified-sum estimator.
//!
//! Budgets come in two modes: a fixed selection count, or an expected-time
//! budget in milliseconds charged at each accepted file's per-record average.
//! All randomness flows through a caller-provided generator; the same seed,
//! catalog, and distribution reproduce the same selection.

mod metropolis;
mod proportional;

use std::collections::HashMap;

use rand::Rng;

use crate::catalog::{Catalog, FileRecord};
use crate::statistics::StratumSnapshot;

pub use metropolis::{mh_lambda, propose_next_target, sample_metropolis};
pub use proportional::{compute_quotas, sample_proportional, sample_uniform_per_stratum};

/// Consecutive-rejection multiple after which a draw from any known stratum
/// is force-accepted.
pub(crate) const SOFT_ACCEPT_FACTOR: f64 = 5.0;

/// Consecutive-rejection multiple after which the draw loop gives up.
pub(crate) const STARVATION_FACTOR: f64 = 10.0;

/// Budget limiting one round's selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleBudget {
    /// Select exactly this many files (catalog size permitting).
    Count(usize),
    /// Select until the expected processing time reaches this many ms.
    TimeMs(f64),
}

impl SampleBudget {
    /// True once the budget allows no further accepts.
    pub(crate) fn is_exhausted(&self, selected: usize, expected_time_ms: f64) -> bool {
        match *self {
            Self::Count(n) => selected >= n,
            Self::TimeMs(ms) => expected_time_ms >= ms,
        }
    }

    /// Scalar the rejection caps are scaled by: the count target, or the
    /// time budget in ms.
    pub(crate) fn cap_scalar(&self) -> f64 {
        match *self {
            Self::Count(n) => n as f64,
            Self::TimeMs(ms) => ms,
        }
    }
}

/// The files chosen for one round.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    files: Vec<FileRecord>,
    total_bytes: u64,
}

impl Selection {
    /// Add one file to the selection.
    pub(crate) fn push(&mut self, record: &FileRecord) {
        self.total_bytes += record.bytes;
        self.files.push(record.clone());
    }

    /// Selected files, in draw order.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Selected paths, in draw order.
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Total byte size of the selection.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of selected files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Selected file count per stratum.
    pub fn counts_by_stratum(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for file in &self.files {
            *counts.entry(file.stratum.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Plain uniform draw of `count` files, used when no distribution exists yet.
pub fn sample_uniform<R: Rng>(catalog: &Catalog, count: usize, rng: &mut R) -> Selection {
    let mut selection = Selection::default();
    if catalog.is_empty() {
        return selection;
    }
    let count = count.min(catalog.len());
    for _ in 0..count {
        let idx = rng.random_range(0..catalog.len());
        selection.push(catalog.get(idx));
    }
    selection
}

/// Expected per-record cost of a stratum, 0 when it has no statistics yet.
pub(crate) fn expected_cost_ms(
    distribution: &HashMap<String, StratumSnapshot>,
    stratum: &str,
) -> f64 {
    distribution.get(stratum).map_or(0.0, |s| s.avg_time_ms)
}
