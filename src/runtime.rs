//! Seam to the external batch-processing runtime.
//!
//! The controller never talks to the cluster directly: it hands a
//! [`RoundSpec`] to a [`RoundRuntime`] and blocks until the round is done.
//! Workers report their statistics out-of-band through the stats server, so
//! nothing flows back through this interface except success or failure.

use std::collections::HashMap;

use crate::error::ControllerError;

/// One processing round, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSpec {
    /// 1-based round index.
    pub round: usize,
    /// Input file paths, in selection order.
    pub inputs: Vec<String>,
    /// Directory the round's reducers write to (`<base>_<round>`).
    pub output_dir: String,
    /// Maximum input split size in bytes (selection bytes over slot count).
    pub split_size_bytes: u64,
    /// Job configuration overrides forwarded to the workers, including the
    /// stats server port and the record time-of-day filter.
    pub overrides: HashMap<String, String>,
}

/// Blocking handle on the external job runtime.
///
/// `submit_round` returns once the round has fully completed; the controller
/// has exactly one suspension point per loop iteration, and this is it. A
/// launch failure is terminal: the controller surfaces it without retrying.
pub trait RoundRuntime {
    /// Launch one round and block until it finishes.
    fn submit_round(&mut self, spec: &RoundSpec) -> Result<(), ControllerError>;
}

impl<T: RoundRuntime + ?Sized> RoundRuntime for Box<T> {
    fn submit_round(&mut self, spec: &RoundSpec) -> Result<(), ControllerError> {
        (**self).submit_round(spec)
    }
}
