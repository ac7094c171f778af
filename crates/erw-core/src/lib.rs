//! # erw-core
//!
//! Shared vocabulary for erwstat: the error type with its stable kinds, the plain data
//! types exchanged between the estimator, the simulator and their callers, and the
//! executor seam used to parallelize Monte Carlo runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error type and stable error kinds.
pub mod error;
/// Execution seams.
pub mod traits;
/// Plain data types.
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use traits::{RunExecutor, RunFn};
pub use types::{
    DataSummary, FieldObservation, FitReport, LabObservation, LatentPrior, ModelParameters,
    PARAMETER_BOUNDS, PARAMETER_NAMES, Posterior, PosteriorRecord, SIGMA_CEIL, SIGMA_FLOOR,
    SimulationRun, SummaryStatistics,
};

/// Crate version, reported by `erwstat version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
