//! The deadline-bounded sampling loop.
//!
//! One controller answers one query: INIT validates the cluster sizing and
//! snapshots the deadline, then rounds run until the deadline passes, the
//! planner predicts that nothing more fits, or the sampler comes back empty.
//! Each round draws a sample, submits it to the external runtime, blocks,
//! harvests the stats the workers pushed, and refreshes the estimator. The
//! deadline is soft: a round in flight is never aborted, and the final report
//! carries the signed overrun.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::collector::StatsCollector;
use crate::config::{Config, SamplePolicy};
use crate::error::ControllerError;
use crate::estimator::StratifiedEstimator;
use crate::planner::{RoundMeasurement, RoundPlanner};
use crate::runtime::{RoundRuntime, RoundSpec};
use crate::sampling::{
    sample_metropolis, sample_proportional, sample_uniform_per_stratum, SampleBudget, Selection,
};
use crate::statistics::{StratumSnapshot, StrataStats};
use crate::types::Estimate;

/// Final answer of one controller run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    /// Stratified-sum estimate with its 95% half-width.
    pub estimate: Estimate,
    /// Rounds completed.
    pub rounds: usize,
    /// `finish - deadline` in ms; positive means the deadline was overrun.
    pub deadline_delta_ms: i64,
    /// Files selected across all rounds.
    pub total_sampled: usize,
}

/// Adaptive sampling controller.
///
/// # Example
///
/// ```ignore
/// let collector = Arc::new(StatsCollector::new());
/// let server = StatsServer::spawn(Arc::clone(&collector), None)?;
/// let mut controller = Controller::new(
///     Config::new().deadline_secs(60).cluster(8, 2),
///     catalog,
///     runtime,
///     collector,
/// )?
/// .with_server_port(server.port());
/// let report = controller.run()?;
/// ```
pub struct Controller<R: RoundRuntime> {
    config: Config,
    catalog: Catalog,
    runtime: R,
    collector: Arc<StatsCollector>,
    planner: RoundPlanner,
    rng: Xoshiro256PlusPlus,
    server_port: Option<u16>,
}

impl<R: RoundRuntime> Controller<R> {
    /// Validate the configuration and build a controller.
    ///
    /// Fails with [`ControllerError::Configuration`] when the cluster sizing
    /// yields zero parallel slots.
    pub fn new(
        config: Config,
        catalog: Catalog,
        runtime: R,
        collector: Arc<StatsCollector>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let seed = config
            .sample_seed
            .unwrap_or_else(|| rand::rng().random());
        let planner = RoundPlanner::new(config.parallel_slots(), config.sample_time_pctg);
        Ok(Self {
            config,
            catalog,
            runtime,
            collector,
            planner,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            server_port: None,
        })
    }

    /// Publish the stats server port to workers via job overrides.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Run the deadline loop and return the final estimate.
    pub fn run(&mut self) -> Result<QueryReport, ControllerError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.deadline_secs);
        info!(
            deadline_secs = self.config.deadline_secs,
            files = self.catalog.len(),
            strata = self.catalog.stratum_count(),
            slots = self.config.parallel_slots(),
            "controller start"
        );

        let mut estimator = StratifiedEstimator::new();
        let mut run_count = 0usize;
        let mut total_sampled = 0usize;
        let mut last_stats = StrataStats::default();
        let mut last_measurement: Option<RoundMeasurement> = None;
        let mut report_empty_folders = self.config.print_empty_folder;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let next_round = run_count + 1;
            info!(round = next_round, "*** sampling round ***");

            let selection = match (next_round, &last_measurement) {
                (1, _) => {
                    sample_uniform_per_stratum(
                        &self.catalog,
                        self.config.size_per_folder,
                        &mut self.rng,
                    )
                }
                (_, Some(measurement)) => {
                    let remaining_ms = deadline.duration_since(now).as_secs_f64() * 1_000.0;
                    let Some(plan) = self.planner.plan(next_round, remaining_ms, measurement)
                    else {
                        info!(round = next_round, "no feasible next round, stopping");
                        break;
                    };
                    self.draw_adaptive(&last_stats, plan.next_count, plan.budget)
                }
                (_, None) => break,
            };

            if selection.is_empty() {
                warn!(
                    round = next_round,
                    "sampler returned no files, stopping the loop"
                );
                break;
            }

            let round_started = Instant::now();
            run_count += 1;
            total_sampled += selection.len();
            let spec = self.round_spec(run_count, &selection);
            info!(
                round = run_count,
                files = selection.len(),
                bytes = selection.total_bytes(),
                split = spec.split_size_bytes,
                "submitting round"
            );
            self.runtime.submit_round(&spec)?;

            let (stats, measurement) =
                self.harvest(run_count, &selection, &mut estimator, round_started);
            last_stats = stats;
            last_measurement = Some(measurement);

            if report_empty_folders {
                let (contributing, empty) = estimator.folder_report();
                info!(?contributing, "strata with valid results");
                warn!(?empty, "strata with zero results");
            }
            // Only the first round reports empty folders.
            report_empty_folders = false;

            if self.config.ground_truth {
                info!("ground-truth mode: single uniform round");
                break;
            }
        }

        let estimate = estimator.log_estimate();
        let finish = Instant::now();
        let deadline_delta_ms = if finish >= deadline {
            let over = finish.duration_since(deadline).as_millis() as i64;
            info!(after_deadline_ms = over, "finished past the deadline");
            over
        } else {
            let under = deadline.duration_since(finish).as_millis() as i64;
            info!(before_deadline_ms = under, "finished within the deadline");
            -under
        };

        Ok(QueryReport {
            estimate,
            rounds: run_count,
            deadline_delta_ms,
            total_sampled,
        })
    }

    /// Draw a round-2+ selection with the configured policy.
    fn draw_adaptive(
        &mut self,
        last_stats: &StrataStats,
        next_count: i64,
        budget: SampleBudget,
    ) -> Selection {
        let distribution = last_stats.snapshot();
        match self.config.policy {
            SamplePolicy::MetropolisHastings => {
                sample_metropolis(&self.catalog, &distribution, budget, &mut self.rng)
            }
            SamplePolicy::Proportional => sample_proportional(
                &self.catalog,
                &distribution,
                next_count.max(0) as usize,
                budget,
                &mut self.rng,
            ),
            SamplePolicy::EqualPerFolder => {
                // Flatten the weights: every stratum gets the same quota.
                let uniform: HashMap<String, StratumSnapshot> = distribution
                    .into_iter()
                    .map(|(stratum, snap)| {
                        (
                            stratum,
                            StratumSnapshot {
                                var: 1.0,
                                ..snap
                            },
                        )
                    })
                    .collect();
                let count = next_count.max(0) as usize;
                sample_proportional(
                    &self.catalog,
                    &uniform,
                    count,
                    SampleBudget::Count(count),
                    &mut self.rng,
                )
            }
        }
    }

    fn round_spec(&self, round: usize, selection: &Selection) -> RoundSpec {
        let slots = self.config.parallel_slots() as u64;
        let mut overrides = HashMap::new();
        overrides.insert(
            "filter.startTimeOfDay".to_string(),
            self.config.start_time_of_day.to_string(),
        );
        overrides.insert(
            "filter.endTimeOfDay".to_string(),
            self.config.end_time_of_day.to_string(),
        );
        if let Some(port) = self.server_port {
            overrides.insert("evstats.serverport".to_string(), port.to_string());
        }
        RoundSpec {
            round,
            inputs: selection.paths(),
            output_dir: format!("{}_{}", self.config.output_base, round),
            split_size_bytes: (selection.total_bytes() / slots).max(1),
            overrides,
        }
    }

    /// Drain the collector and rebuild statistics for the finished round.
    fn harvest(
        &mut self,
        round: usize,
        selection: &Selection,
        estimator: &mut StratifiedEstimator,
        round_started: Instant,
    ) -> (StrataStats, RoundMeasurement) {
        let harvest = self.collector.drain_round();
        if harvest.is_empty() {
            warn!(round, "round produced no worker statistics");
        }
        if let Some(span) = harvest.map_phase_ms() {
            info!(round, map_phase_ms = span, "map phase span");
        }
        if let Some(avg) = harvest.avg_reducer_ms() {
            info!(round, avg_reducer_ms = avg, "reducer time");
        }

        let mut stats = StrataStats::from_round(&harvest.time_samples);
        let sampled = selection.counts_by_stratum();
        let round_variances = estimator.absorb_round(&harvest.reduce_results, &sampled);
        stats.set_reduce_variances(&round_variances);
        stats.log();
        estimator.log_estimate();

        let summary = stats.summary();
        let measurement = RoundMeasurement {
            wall_time_ms: round_started.elapsed().as_secs_f64() * 1_000.0,
            avg_record_ms: summary.avg_record_ms,
            records: summary.reports,
        };
        (stats, measurement)
    }
}
