//! Shared fixtures: a synthetic stratified catalog and a fake cluster
//! runtime that plays back worker statistics into the collector.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use circa::{
    stratum_of, Catalog, ControllerError, RoundRuntime, RoundSpec, StatsCollector, TaskSpan,
    TimeSample,
};

/// Install the test log subscriber once; honors `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Per-stratum behavior of the synthetic cluster.
#[derive(Debug, Clone, Copy)]
pub struct StratumProfile {
    /// Uniform per-record processing time range, microseconds.
    pub time_us: (u64, u64),
    /// Mean per-record value.
    pub value_mean: f64,
    /// Per-record value spread (uniform, matched standard deviation).
    pub value_sigma: f64,
}

/// Catalog of `files_per_stratum` files in each of the strata `a..d`.
pub fn four_strata_catalog(files_per_stratum: usize) -> Catalog {
    let strata = ["a", "b", "c", "d"];
    Catalog::from_entries(strata.iter().flat_map(|s| {
        (0..files_per_stratum).map(move |i| (format!("/input/{s}/{i:05}.dat"), 1_000u64))
    }))
}

/// Profiles with per-stratum value sigma ratio 1:2:3:4 and ~1ms records.
pub fn sigma_ladder_profiles() -> HashMap<String, StratumProfile> {
    let mut profiles = HashMap::new();
    for (i, s) in ["a", "b", "c", "d"].iter().enumerate() {
        profiles.insert(
            s.to_string(),
            StratumProfile {
                time_us: (900, 1_100),
                value_mean: 10.0,
                value_sigma: (i + 1) as f64,
            },
        );
    }
    profiles
}

/// Fake cluster: processes a round synchronously and pushes the statistics a
/// real worker fleet would have reported.
pub struct SyntheticRuntime {
    collector: Arc<StatsCollector>,
    profiles: HashMap<String, StratumProfile>,
    rng: Xoshiro256PlusPlus,
    delay: Option<Duration>,
    fail_submission: bool,
    log: Arc<Mutex<Vec<RoundSpec>>>,
}

impl SyntheticRuntime {
    pub fn new(collector: Arc<StatsCollector>, profiles: HashMap<String, StratumProfile>) -> Self {
        Self {
            collector,
            profiles,
            rng: Xoshiro256PlusPlus::seed_from_u64(0xC1DCA),
            delay: None,
            fail_submission: false,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep this long per round, simulating cluster wall time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every submission with a launch error.
    pub fn with_failing_submission(mut self) -> Self {
        self.fail_submission = true;
        self
    }

    /// Shared handle on the submitted round specs.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<RoundSpec>>> {
        Arc::clone(&self.log)
    }
}

impl RoundRuntime for SyntheticRuntime {
    fn submit_round(&mut self, spec: &RoundSpec) -> Result<(), ControllerError> {
        if self.fail_submission {
            return Err(ControllerError::RoundSubmission(
                "synthetic launch failure".into(),
            ));
        }
        self.log.lock().unwrap().push(spec.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.collector.add_mapper_time(TaskSpan {
            start_ms: spec.round as u64 * 1_000,
            duration_ms: 40,
        });

        // Per-record timings, grouped values per stratum for the reducers.
        let mut values_by_stratum: HashMap<String, Vec<f64>> = HashMap::new();
        for path in &spec.inputs {
            let stratum = stratum_of(path);
            let Some(profile) = self.profiles.get(&stratum) else {
                continue;
            };
            let (lo, hi) = profile.time_us;
            self.collector.add_time(TimeSample {
                stratum: stratum.clone(),
                record_key: path.clone(),
                micros: self.rng.random_range(lo..=hi),
            });
            // Uniform spread with standard deviation value_sigma.
            let half_width = profile.value_sigma * 3.0f64.sqrt();
            let value = profile.value_mean + (self.rng.random::<f64>() * 2.0 - 1.0) * half_width;
            values_by_stratum.entry(stratum).or_default().push(value);
        }

        let mut strata = Vec::new();
        let mut values = Vec::new();
        let mut variances = Vec::new();
        for (stratum, record_values) in values_by_stratum {
            let n = record_values.len() as f64;
            let mean = record_values.iter().sum::<f64>() / n;
            let var = if record_values.len() > 1 {
                record_values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            strata.push(stratum);
            values.push(mean);
            variances.push(var);
        }
        if !strata.is_empty() {
            self.collector
                .add_reduce(strata, values, variances)
                .expect("reduce lists are parallel by construction");
        }

        self.collector.add_reducer_time(TaskSpan {
            start_ms: spec.round as u64 * 1_000 + 40,
            duration_ms: 15,
        });
        Ok(())
    }
}
