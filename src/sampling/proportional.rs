//! Quota-based stratified selection, proportional to value spread.

use std::collections::HashMap;

use rand::Rng;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::statistics::StratumSnapshot;

use super::{
    expected_cost_ms, sample_uniform, SampleBudget, Selection, SOFT_ACCEPT_FACTOR,
    STARVATION_FACTOR,
};

/// Per-stratum quotas: `q(s) = target * sqrt(var(s)) / sum sqrt(var)`.
///
/// The quotas sum to `target` up to rounding; strata with larger value
/// spread get proportionally more of the draw.
pub fn compute_quotas(
    distribution: &HashMap<String, StratumSnapshot>,
    target: usize,
) -> HashMap<String, f64> {
    let total_sigma: f64 = distribution.values().map(|s| s.var.sqrt()).sum();
    if total_sigma <= 0.0 {
        return distribution.keys().map(|k| (k.clone(), 0.0)).collect();
    }
    distribution
        .iter()
        .map(|(stratum, snap)| {
            let quota = target as f64 * snap.var.sqrt() / total_sigma;
            debug!(stratum = %stratum, quota, "stratum quota");
            (stratum.clone(), quota)
        })
        .collect()
}

/// First-round selection: an equal quota for every discovered stratum.
///
/// Assigns variance 1 to each stratum of the catalog and draws
/// `size_per_folder * |strata|` files through the proportional path, which
/// degenerates to `size_per_folder` per stratum.
pub fn sample_uniform_per_stratum<R: Rng>(
    catalog: &Catalog,
    size_per_folder: usize,
    rng: &mut R,
) -> Selection {
    let distribution: HashMap<String, StratumSnapshot> = catalog
        .strata()
        .into_iter()
        .map(|stratum| {
            (
                stratum,
                StratumSnapshot {
                    count: 0,
                    avg_time_ms: 0.0,
                    var: 1.0,
                },
            )
        })
        .collect();
    let target = size_per_folder * distribution.len();
    sample_proportional(
        catalog,
        &distribution,
        target,
        SampleBudget::Count(target),
        rng,
    )
}

/// Stratified selection with sqrt-variance quotas.
///
/// Uniform draws over the catalog; a draw in stratum `s` is accepted while
/// `q(s) >= 1`, spending one quota unit per accept. The loop stops when the
/// budget is exhausted (count reached, or accumulated expected time passes
/// the time budget). Fail-safety: after `5 * budget` consecutive rejections
/// any draw from a stratum the distribution knows is force-accepted; after
/// `10 * budget` the loop gives up and returns what it has.
pub fn sample_proportional<R: Rng>(
    catalog: &Catalog,
    distribution: &HashMap<String, StratumSnapshot>,
    quota_target: usize,
    budget: SampleBudget,
    rng: &mut R,
) -> Selection {
    if distribution.is_empty() {
        // No statistics yet: degrade to a plain uniform draw in count mode,
        // nothing in time mode.
        return match budget {
            SampleBudget::Count(n) => sample_uniform(catalog, n, rng),
            SampleBudget::TimeMs(_) => Selection::default(),
        };
    }
    let mut selection = Selection::default();
    if catalog.is_empty() {
        return selection;
    }

    let quota_target = quota_target.min(catalog.len());
    let mut quotas = compute_quotas(distribution, quota_target);
    let cap = budget.cap_scalar();
    let mut expected_time_ms = 0.0;
    let mut fail_count = 0.0f64;

    while !budget.is_exhausted(selection.len(), expected_time_ms)
        && selection.len() < catalog.len()
    {
        let record = catalog.get(rng.random_range(0..catalog.len()));
        let stratum = record.stratum.as_str();

        let quota = quotas.get_mut(stratum);
        let accepted = match quota {
            Some(q) if *q >= 1.0 => {
                *q -= 1.0;
                true
            }
            _ => false,
        };

        if accepted {
            expected_time_ms += expected_cost_ms(distribution, stratum);
            selection.push(record);
            fail_count = 0.0;
            continue;
        }

        fail_count += 1.0;
        if fail_count > STARVATION_FACTOR * cap {
            warn!(
                selected = selection.len(),
                "sampler starved, returning a short selection"
            );
            break;
        }
        if fail_count > SOFT_ACCEPT_FACTOR * cap {
            // Too many misses: accept anything the distribution knows about.
            if let Some(q) = quotas.get_mut(stratum) {
                *q -= 1.0;
                expected_time_ms += expected_cost_ms(distribution, stratum);
                selection.push(record);
                fail_count = 0.0;
            }
        }
    }
    selection
}
