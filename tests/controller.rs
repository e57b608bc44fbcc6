//! End-to-end scenarios for the deadline loop on a synthetic cluster.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use circa::{
    sampling::{sample_metropolis, sample_proportional, sample_uniform_per_stratum},
    stratum_of, Catalog, Config, Controller, ControllerError, RoundPlanner, SampleBudget,
    StatsCollector, StrataStats, StratumSnapshot, TimeSample,
};

use common::{four_strata_catalog, sigma_ladder_profiles, SyntheticRuntime};

fn stratum_counts(inputs: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for path in inputs {
        *counts.entry(stratum_of(path)).or_insert(0) += 1;
    }
    counts
}

// S1: a single uniform round draws exactly size_per_folder files per stratum.
#[test]
fn ground_truth_round_draws_uniform_per_stratum() {
    common::init_tracing();
    let collector = Arc::new(StatsCollector::new());
    let runtime = SyntheticRuntime::new(Arc::clone(&collector), sigma_ladder_profiles());
    let log = runtime.log_handle();

    let config = Config::new()
        .deadline_secs(2)
        .size_per_folder(5)
        .cluster(2, 2)
        .ground_truth(true)
        .sample_seed(101);
    let mut controller =
        Controller::new(config, four_strata_catalog(250), runtime, Arc::clone(&collector))
            .unwrap();
    let report = controller.run().unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(report.total_sampled, 20);
    assert!(report.estimate.error >= 0.0);
    // Per-stratum mean value is 10, so the stratified sum sits near 40.
    assert!((report.estimate.value - 40.0).abs() < 8.0);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    let counts = stratum_counts(&log[0].inputs);
    for stratum in ["a", "b", "c", "d"] {
        assert_eq!(counts[stratum], 5, "stratum {stratum}");
    }

    // Round-scope purity: the harvest drained everything.
    assert_eq!(collector.pending_times(), 0);
}

// S2: by round 3 the Metropolis-Hastings walk samples strata in the same
// order as their true value spread (sigma ratio 1:2:3:4).
#[test]
fn mh_sampling_tracks_sigma_ordering_by_round_three() {
    common::init_tracing();
    let collector = Arc::new(StatsCollector::new());
    let runtime = SyntheticRuntime::new(Arc::clone(&collector), sigma_ladder_profiles())
        .with_delay(Duration::from_millis(100));
    let log = runtime.log_handle();

    let config = Config::new()
        .deadline_secs(2)
        .size_per_folder(25)
        .cluster(2, 2)
        .sample_seed(7);
    let mut controller =
        Controller::new(config, four_strata_catalog(250), runtime, Arc::clone(&collector))
            .unwrap();
    let report = controller.run().unwrap();

    let log = log.lock().unwrap();
    assert!(
        log.len() >= 3,
        "expected at least 3 rounds, got {} ({report:?})",
        log.len()
    );
    let counts = stratum_counts(&log[2].inputs);
    let get = |s: &str| counts.get(s).copied().unwrap_or(0);
    assert!(
        get("d") > get("c") && get("c") > get("b") && get("b") > get("a"),
        "round-3 counts not ordered by sigma: {counts:?}"
    );
}

// S3: the planner turns measured cost into the documented next-round size.
#[test]
fn planner_prediction_matches_hand_computation() {
    let planner = RoundPlanner::new(4, 0.3);
    // avg 100ms, 40s remaining, 5s overhead -> floor(35000/100*4) = 1400.
    assert_eq!(planner.next_count(40_000.0, 5_000.0, 100.0), 1_400);
}

// S4: a distribution over strata the catalog does not contain starves the
// sampler; it gives up after the rejection cap with a short selection.
#[test]
fn sampler_starves_on_unavailable_strata() {
    let catalog = Catalog::from_entries((0..100).map(|i| (format!("/input/a/{i}.dat"), 10u64)));
    let mut distribution = HashMap::new();
    for s in ["b", "c", "d"] {
        distribution.insert(
            s.to_string(),
            StratumSnapshot {
                count: 20,
                avg_time_ms: 1.0,
                var: 1.0,
            },
        );
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(19);
    let mh = sample_metropolis(&catalog, &distribution, SampleBudget::Count(10), &mut rng);
    assert!(mh.is_empty());

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(19);
    let quota = sample_proportional(&catalog, &distribution, 10, SampleBudget::Count(10), &mut rng);
    assert!(quota.is_empty());
}

// S5: a round that overruns the deadline is allowed to finish; the loop exits
// at the next top and reports a positive overrun.
#[test]
fn overrunning_round_finishes_and_reports_overrun() {
    let collector = Arc::new(StatsCollector::new());
    let runtime = SyntheticRuntime::new(Arc::clone(&collector), sigma_ladder_profiles())
        .with_delay(Duration::from_millis(1_400));
    let log = runtime.log_handle();

    let config = Config::new()
        .deadline_secs(1)
        .size_per_folder(5)
        .cluster(2, 2)
        .sample_seed(3);
    let mut controller =
        Controller::new(config, four_strata_catalog(50), runtime, Arc::clone(&collector)).unwrap();
    let report = controller.run().unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert!(
        report.deadline_delta_ms > 0,
        "expected overrun, got {}",
        report.deadline_delta_ms
    );
}

// S6: a single timing sample at 100x the mean is rejected by the 2-sigma
// filter and barely moves the per-stratum average.
#[test]
fn outlier_sample_is_rejected_from_stats() {
    let clean: Vec<TimeSample> = (0..200)
        .map(|i| TimeSample {
            stratum: "a".into(),
            record_key: format!("a/{i}.dat"),
            micros: 10_000 + (i % 11) * 150,
        })
        .collect();
    let mut polluted = clean.clone();
    polluted.push(TimeSample {
        stratum: "a".into(),
        record_key: "a/outlier.dat".into(),
        micros: 1_030_000,
    });

    let clean_stats = StrataStats::from_round(&clean);
    let polluted_stats = StrataStats::from_round(&polluted);

    let clean_a = clean_stats.get("a").unwrap();
    let polluted_a = polluted_stats.get("a").unwrap();
    assert_eq!(polluted_a.time.count(), clean_a.time.count());
    assert_eq!(polluted_stats.summary().rejected, 1);

    let drift = (polluted_a.time.avg() - clean_a.time.avg()).abs() / clean_a.time.avg();
    assert!(drift < 0.01, "avg drifted {:.4}%", drift * 100.0);
}

// A failed launch is terminal: no retries, the error reaches the caller.
#[test]
fn failed_submission_is_fatal() {
    let collector = Arc::new(StatsCollector::new());
    let runtime = SyntheticRuntime::new(Arc::clone(&collector), sigma_ladder_profiles())
        .with_failing_submission();

    let config = Config::new().deadline_secs(2).cluster(1, 2).sample_seed(5);
    let mut controller =
        Controller::new(config, four_strata_catalog(50), runtime, collector).unwrap();
    assert!(matches!(
        controller.run(),
        Err(ControllerError::RoundSubmission(_))
    ));
}

// Output directories are suffixed with the round index.
#[test]
fn output_dirs_carry_round_index() {
    let collector = Arc::new(StatsCollector::new());
    let runtime = SyntheticRuntime::new(Arc::clone(&collector), sigma_ladder_profiles())
        .with_delay(Duration::from_millis(200));
    let log = runtime.log_handle();

    let config = Config::new()
        .deadline_secs(1)
        .size_per_folder(5)
        .cluster(2, 2)
        .output_base("/out/query")
        .sample_seed(23);
    let mut controller =
        Controller::new(config, four_strata_catalog(100), runtime, Arc::clone(&collector))
            .unwrap();
    controller.run().unwrap();

    let log = log.lock().unwrap();
    for (i, spec) in log.iter().enumerate() {
        assert_eq!(spec.output_dir, format!("/out/query_{}", i + 1));
    }
}

// Property 7: with uniform-per-stratum draws, treating per-stratum sample
// means as stratum totals is unbiased for the exact stratified sum.
#[test]
fn stratified_estimator_is_unbiased_on_seeded_catalog() {
    let catalog = four_strata_catalog(250);
    // Deterministic per-record value: stratum mean + a fixed within-stratum
    // wobble derived from the file index.
    let record_value = |path: &str| -> f64 {
        let stratum = stratum_of(path);
        let idx: u64 = path
            .rsplit('/')
            .next()
            .unwrap()
            .trim_end_matches(".dat")
            .parse()
            .unwrap();
        let mean = match stratum.as_str() {
            "a" => 10.0,
            "b" => 20.0,
            "c" => 30.0,
            _ => 40.0,
        };
        let wobble = ((idx.wrapping_mul(2_654_435_761) % 1_000) as f64 / 1_000.0 - 0.5) * 4.0;
        mean + wobble
    };

    let exact_sum: f64 = catalog
        .records()
        .iter()
        .map(|r| record_value(&r.path))
        .sum();

    let runs = 40;
    let mut estimates = 0.0;
    for seed in 0..runs {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let selection = sample_uniform_per_stratum(&catalog, 10, &mut rng);
        let mut by_stratum: HashMap<String, Vec<f64>> = HashMap::new();
        for file in selection.files() {
            by_stratum
                .entry(file.stratum.clone())
                .or_default()
                .push(record_value(&file.path));
        }
        // Scale each stratum's sample mean up to a stratum total.
        estimates += by_stratum
            .values()
            .map(|vs| vs.iter().sum::<f64>() / vs.len() as f64 * 250.0)
            .sum::<f64>();
    }
    let mean_estimate = estimates / runs as f64;

    let rel = (mean_estimate - exact_sum).abs() / exact_sum;
    assert!(
        rel < 0.02,
        "estimator biased: mean {mean_estimate} vs exact {exact_sum}"
    );
}
