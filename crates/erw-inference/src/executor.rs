//! Run executors: how Monte Carlo run indices are mapped onto threads.

use erw_core::{Error, Result, RunExecutor, RunFn, SimulationRun};
use rayon::prelude::*;

/// Runs one index after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl RunExecutor for SequentialExecutor {
    fn map_runs(&self, n_runs: usize, run: &RunFn<'_>) -> Result<Vec<SimulationRun>> {
        (0..n_runs).map(run).collect()
    }

    fn name(&self) -> &str {
        "sequential"
    }
}

/// Parallel map over run indices with rayon.
///
/// `n_threads == 0` uses the global pool; otherwise a dedicated pool of that size is
/// built per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor {
    /// Worker threads (0 = rayon global pool).
    pub n_threads: usize,
}

impl RayonExecutor {
    /// Executor with `n_threads` workers (0 = global pool).
    pub fn new(n_threads: usize) -> Self {
        Self { n_threads }
    }
}

impl RunExecutor for RayonExecutor {
    fn map_runs(&self, n_runs: usize, run: &RunFn<'_>) -> Result<Vec<SimulationRun>> {
        let map = || (0..n_runs).into_par_iter().map(run).collect::<Result<Vec<_>>>();
        if self.n_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.n_threads)
                .build()
                .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
            pool.install(map)
        } else {
            map()
        }
    }

    fn name(&self) -> &str {
        "rayon"
    }
}
