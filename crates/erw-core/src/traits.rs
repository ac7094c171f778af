//! Core traits for erwstat
//!
//! The simulator describes *what* one Monte Carlo run computes; a [`RunExecutor`]
//! decides *how* run indices are mapped onto threads. Swapping executors never changes
//! the per-run algorithm or its random stream.

use crate::Result;
use crate::types::SimulationRun;

/// Per-run work item handed to an executor.
pub type RunFn<'a> = dyn Fn(usize) -> Result<SimulationRun> + Sync + 'a;

/// Parallel-map strategy across Monte Carlo runs.
pub trait RunExecutor: Send + Sync {
    /// Evaluate `run(i)` for every `i in 0..n_runs`.
    ///
    /// Implementations must return runs ordered by index and fail as a whole
    /// if any single run fails.
    fn map_runs(&self, n_runs: usize, run: &RunFn<'_>) -> Result<Vec<SimulationRun>>;

    /// Executor name (e.g., "sequential", "rayon")
    fn name(&self) -> &str;
}
