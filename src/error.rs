//! Error types for the sampling controller.

use std::fmt;

/// Error returned by controller construction or the round loop.
///
/// `Configuration` and `RoundSubmission` are fatal and surface to the caller.
/// Stats-ingestion problems and sampler starvation are recovered locally with
/// warnings and never reach this type; a blown deadline is reported as a
/// signed delta in [`crate::controller::QueryReport`], not as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Cluster sizing is missing or invalid (e.g. zero parallel slots).
    Configuration(String),

    /// The external runtime failed to launch a processing round.
    ///
    /// No retries are attempted; the round loop stops and the error is
    /// returned to the caller.
    RoundSubmission(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::RoundSubmission(msg) => write!(f, "round submission failed: {msg}"),
        }
    }
}

impl std::error::Error for ControllerError {}

/// Error raised while decoding a single stats push from a worker.
///
/// Always recovered locally: the offending message is dropped with a warning
/// and ingestion continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsIngestError {
    /// The message was not valid JSON or did not match the protocol schema.
    Malformed(String),

    /// A submission carried no payload (empty batch, empty stratum list).
    Empty,

    /// Parallel lists in a reduce push had different lengths.
    LengthMismatch {
        /// Number of stratum keys in the push.
        strata: usize,
        /// Number of values in the push.
        values: usize,
        /// Number of variances in the push.
        variances: usize,
    },
}

impl fmt::Display for StatsIngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed stats push: {msg}"),
            Self::Empty => write!(f, "empty stats push"),
            Self::LengthMismatch {
                strata,
                values,
                variances,
            } => write!(
                f,
                "reduce push length mismatch: {strata} strata, {values} values, {variances} variances"
            ),
        }
    }
}

impl std::error::Error for StatsIngestError {}
