//! Metropolis-Hastings stratum walk.
//!
//! The walker keeps a target stratum and only accepts files drawn from it.
//! After each accept it proposes a uniformly chosen stratum and moves with
//! probability `min(1, lambda)`, where `lambda` compares the posterior
//! variance parameters of the proposal and the current stratum. Strata whose
//! reduced values spread more end up targeted more often, which is exactly
//! where extra samples shrink the stratified-sum estimator's variance
//! fastest.

use std::collections::HashMap;

use rand::Rng;
use tracing::warn;

use crate::catalog::Catalog;
use crate::statistics::StratumSnapshot;

use super::{
    expected_cost_ms, sample_uniform, SampleBudget, Selection, SOFT_ACCEPT_FACTOR,
    STARVATION_FACTOR,
};

/// Move probability from `cur` to `proposal`.
///
/// With `alpha(x) = (count_x - 1)/2` and `beta(x) = (count_x - 1)/(2 var_x)`:
///
/// ```text
/// lambda = sqrt( alpha_y * beta_cur / (beta_y * (alpha_cur - 1)) )
/// ```
///
/// `alpha_cur <= 1` (fewer than four accepted samples) makes the denominator
/// vanish or flip sign, so the walk falls back to `lambda = 1` and always
/// moves; the same applies to any non-finite result of the formula.
pub fn mh_lambda(cur: &StratumSnapshot, proposal: &StratumSnapshot) -> f64 {
    let alpha_cur = (cur.count as f64 - 1.0) / 2.0;
    let alpha_nxt = (proposal.count as f64 - 1.0) / 2.0;
    let beta_cur = (cur.count as f64 - 1.0) / (2.0 * cur.var);
    let beta_nxt = (proposal.count as f64 - 1.0) / (2.0 * proposal.var);

    if alpha_cur <= 1.0 {
        return 1.0;
    }
    let lambda = (alpha_nxt * beta_cur / (beta_nxt * (alpha_cur - 1.0))).sqrt();
    if lambda.is_finite() {
        lambda
    } else {
        1.0
    }
}

/// One proposal step: pick `proposal` or stay at `cur`.
///
/// Pure in `(cur, proposal, their snapshots, rng draw)`: replaying the same
/// inputs with the same generator state reproduces the decision.
pub fn propose_next_target<R: Rng>(
    cur: &str,
    proposal: &str,
    distribution: &HashMap<String, StratumSnapshot>,
    rng: &mut R,
) -> String {
    if cur == proposal {
        return cur.to_string();
    }
    let (Some(cur_snap), Some(nxt_snap)) = (distribution.get(cur), distribution.get(proposal))
    else {
        return cur.to_string();
    };
    let lambda = mh_lambda(cur_snap, nxt_snap);
    if lambda >= 1.0 || rng.random::<f64>() <= lambda {
        proposal.to_string()
    } else {
        cur.to_string()
    }
}

/// Metropolis-Hastings selection under a count or time budget.
///
/// A draw is accepted iff its stratum is known to the distribution and the
/// walker either has no target yet or targets that stratum. The rejection
/// caps match the proportional sampler: `5 * budget` consecutive misses
/// force-accept known strata, `10 * budget` ends the draw.
pub fn sample_metropolis<R: Rng>(
    catalog: &Catalog,
    distribution: &HashMap<String, StratumSnapshot>,
    budget: SampleBudget,
    rng: &mut R,
) -> Selection {
    if distribution.is_empty() {
        return match budget {
            SampleBudget::Count(n) => sample_uniform(catalog, n, rng),
            SampleBudget::TimeMs(_) => Selection::default(),
        };
    }
    let mut selection = Selection::default();
    if catalog.is_empty() {
        return selection;
    }

    // Sorted keys make the uniform stratum proposal independent of hash
    // iteration order, keeping seeded runs reproducible.
    let mut strata: Vec<&String> = distribution.keys().collect();
    strata.sort();

    let cap = budget.cap_scalar();
    let mut target: Option<String> = None;
    let mut expected_time_ms = 0.0;
    let mut fail_count = 0.0f64;

    while !budget.is_exhausted(selection.len(), expected_time_ms)
        && selection.len() < catalog.len()
    {
        let record = catalog.get(rng.random_range(0..catalog.len()));
        let stratum = record.stratum.as_str();

        let known = distribution.contains_key(stratum);
        let wanted = target.as_deref().is_none_or(|t| t == stratum);

        if known && wanted {
            expected_time_ms += expected_cost_ms(distribution, stratum);
            selection.push(record);
            fail_count = 0.0;

            let proposal = strata[rng.random_range(0..strata.len())];
            target = Some(propose_next_target(stratum, proposal, distribution, rng));
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
        if fail_count > SOFT_ACCEPT_FACTOR * cap && known {
            expected_time_ms += expected_cost_ms(distribution, stratum);
            selection.push(record);
            fail_count = 0.0;
        }
    }
    selection
}
