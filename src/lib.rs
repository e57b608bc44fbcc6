//! # circa
//!
//! Deadline-bounded approximate aggregation over stratified batch inputs.
//!
//! A query over a huge folder-organized input collection would take hours to
//! run exhaustively. `circa` instead runs short processing rounds over
//! adaptively chosen samples and returns, within a wall-clock deadline, a
//! stratified-sum estimate together with a 95%-confidence error bound:
//!
//! - Round 1 draws a fixed number of files per folder (stratum) to measure
//!   per-record cost and per-stratum value variance.
//! - Later rounds size themselves from the remaining time and the measured
//!   round overhead, and concentrate draws on high-variance strata, either
//!   with explicit quotas or with a Metropolis-Hastings walk.
//! - Worker tasks push per-record timings and reducer outputs to a stats
//!   server while each round runs; between rounds the controller drains
//!   them, rejects outliers, and refreshes the estimator.
//!
//! The distributed runtime that actually processes a sample is a collaborator
//! behind the [`RoundRuntime`] trait; this crate owns the controller loop,
//! the samplers, the statistics, and the estimator.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use circa::{Catalog, Config, Controller, StatsCollector, StatsServer};
//!
//! let catalog = Catalog::from_entries(list_input_files()?);
//! let collector = Arc::new(StatsCollector::new());
//! let server = StatsServer::spawn(Arc::clone(&collector), None)?;
//!
//! let mut controller = Controller::new(
//!     Config::new().deadline_secs(120).cluster(datanodes, 2),
//!     catalog,
//!     cluster_runtime,
//!     collector,
//! )?
//! .with_server_port(server.port());
//!
//! let report = controller.run()?;
//! println!("{} +- {}", report.estimate.value, report.estimate.error);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod types;

pub mod catalog;
pub mod collector;
pub mod controller;
pub mod estimator;
pub mod planner;
pub mod runtime;
pub mod sampling;
pub mod statistics;

// Re-exports for the public API
pub use catalog::{stratum_of, Catalog, FileRecord};
pub use collector::{StatsCollector, StatsMessage, StatsServer};
pub use config::{Config, SamplePolicy};
pub use controller::{Controller, QueryReport};
pub use error::{ControllerError, StatsIngestError};
pub use estimator::StratifiedEstimator;
pub use planner::{RoundMeasurement, RoundPlan, RoundPlanner};
pub use runtime::{RoundRuntime, RoundSpec};
pub use sampling::{SampleBudget, Selection};
pub use statistics::{StrataStats, StratumSnapshot, ValueStats};
pub use types::{Estimate, ReduceResult, TaskSpan, TimeSample};
