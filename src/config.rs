//! Configuration for the sampling controller.

use crate::error::ControllerError;

/// Sampling strategy used from the second round onward.
///
/// The first round always draws uniformly per stratum to seed the time and
/// variance statistics; later rounds pick files according to this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplePolicy {
    /// Metropolis-Hastings walk over strata, targeting per-stratum variance.
    #[default]
    MetropolisHastings,

    /// Per-stratum quotas proportional to the standard deviation of the
    /// reduced value.
    Proportional,

    /// Equal quota for every stratum, every round.
    EqualPerFolder,
}

/// Configuration options for [`crate::Controller`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Total wall-clock budget for the round loop, in seconds (default: 120).
    pub deadline_secs: u64,

    /// Files drawn per stratum in the first round (default: 30).
    pub size_per_folder: usize,

    /// Fraction of post-overhead remaining time granted to round 2
    /// (default: 0.30).
    ///
    /// Round 2 is deliberately short: it exists to measure per-stratum value
    /// variance, and the bulk of the budget is kept for round 3 onward.
    pub sample_time_pctg: f64,

    /// Strategy for rounds >= 2 (default: Metropolis-Hastings).
    pub policy: SamplePolicy,

    /// If true, run the uniform first round only and skip adaptation
    /// (default: false).
    pub ground_truth: bool,

    /// Workers drop records captured before this hour of day (default: 10).
    ///
    /// Filtering happens inside the external runtime; the controller only
    /// forwards the bound as a job override.
    pub start_time_of_day: u8,

    /// Workers drop records captured after this hour of day (default: 16).
    pub end_time_of_day: u8,

    /// Report strata that produced zero contribution after the first round
    /// (default: false).
    pub print_empty_folder: bool,

    /// Number of data nodes in the cluster (default: 1).
    pub datanodes: usize,

    /// Map slots per node (default: 2). Parallel width is
    /// `datanodes * max_maps_per_node`.
    pub max_maps_per_node: usize,

    /// Port for the stats ingestion server. `None` picks a random port in
    /// `[10593, 11593)` (default: None).
    pub server_port: Option<u16>,

    /// Base path for per-round output directories; round `r` writes to
    /// `<output_base>_<r>`.
    pub output_base: String,

    /// Optional deterministic seed for all sampler randomness.
    ///
    /// With the same seed, catalog, and statistics, every round draws the
    /// same selection.
    pub sample_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deadline_secs: 120,
            size_per_folder: 30,
            sample_time_pctg: 0.30,
            policy: SamplePolicy::default(),
            ground_truth: false,
            start_time_of_day: 10,
            end_time_of_day: 16,
            print_empty_folder: false,
            datanodes: 1,
            max_maps_per_node: 2,
            server_port: None,
            output_base: "circa-out".to_string(),
            sample_seed: None,
        }
    }
}

impl Config {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall-clock deadline in seconds.
    pub fn deadline_secs(mut self, secs: u64) -> Self {
        self.deadline_secs = secs;
        self
    }

    /// Set the first-round per-stratum draw size.
    pub fn size_per_folder(mut self, n: usize) -> Self {
        assert!(n > 0, "size_per_folder must be > 0");
        self.size_per_folder = n;
        self
    }

    /// Set the round-2 time fraction.
    pub fn sample_time_pctg(mut self, pctg: f64) -> Self {
        assert!(
            pctg > 0.0 && pctg <= 1.0,
            "sample_time_pctg must be in (0, 1]"
        );
        self.sample_time_pctg = pctg;
        self
    }

    /// Set the sampling policy for adaptive rounds.
    pub fn policy(mut self, policy: SamplePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the uniform first round only.
    pub fn ground_truth(mut self, enabled: bool) -> Self {
        self.ground_truth = enabled;
        self
    }

    /// Report zero-contribution strata after round 1.
    pub fn print_empty_folder(mut self, enabled: bool) -> Self {
        self.print_empty_folder = enabled;
        self
    }

    /// Set the cluster sizing used to derive the parallel slot count.
    pub fn cluster(mut self, datanodes: usize, max_maps_per_node: usize) -> Self {
        self.datanodes = datanodes;
        self.max_maps_per_node = max_maps_per_node;
        self
    }

    /// Pin the stats server port instead of randomizing it.
    pub fn server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Set the output directory base path.
    pub fn output_base(mut self, base: impl Into<String>) -> Self {
        self.output_base = base.into();
        self
    }

    /// Seed the sampler for reproducible selections.
    pub fn sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }

    /// Parallel execution width: `datanodes * max_maps_per_node`.
    pub fn parallel_slots(&self) -> usize {
        self.datanodes * self.max_maps_per_node
    }

    /// Check cluster sizing. The controller refuses to start with zero
    /// parallel slots.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.parallel_slots() == 0 {
            return Err(ControllerError::Configuration(format!(
                "no map slots: datanodes={} max_maps_per_node={}",
                self.datanodes, self.max_maps_per_node
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.deadline_secs, 120);
        assert_eq!(config.size_per_folder, 30);
        assert!((config.sample_time_pctg - 0.30).abs() < 1e-12);
        assert_eq!(config.policy, SamplePolicy::MetropolisHastings);
        assert!(!config.ground_truth);
        assert_eq!(config.start_time_of_day, 10);
        assert_eq!(config.end_time_of_day, 16);
        assert_eq!(config.parallel_slots(), 2);
        assert!(config.server_port.is_none());
    }

    #[test]
    fn builder_chains() {
        let config = Config::new()
            .deadline_secs(30)
            .size_per_folder(5)
            .cluster(4, 2)
            .policy(SamplePolicy::Proportional)
            .sample_seed(42);
        assert_eq!(config.deadline_secs, 30);
        assert_eq!(config.size_per_folder, 5);
        assert_eq!(config.parallel_slots(), 8);
        assert_eq!(config.policy, SamplePolicy::Proportional);
        assert_eq!(config.sample_seed, Some(42));
    }

    #[test]
    fn validate_rejects_zero_slots() {
        let config = Config::new().cluster(0, 2);
        assert!(matches!(
            config.validate(),
            Err(ControllerError::Configuration(_))
        ));
    }

    #[test]
    #[should_panic(expected = "size_per_folder must be > 0")]
    fn size_per_folder_zero_panics() {
        let _ = Config::new().size_per_folder(0);
    }

    #[test]
    #[should_panic(expected = "sample_time_pctg must be in (0, 1]")]
    fn pctg_out_of_range_panics() {
        let _ = Config::new().sample_time_pctg(1.5);
    }
}
