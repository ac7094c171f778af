//! Monte Carlo projection of cumulative CO₂ removal.
//!
//! Each run samples an initial latent state from the posterior, walks both channels
//! forward month by month and accumulates `A * K * exp(eta_r) * logistic(eta_phi)`,
//! scaled by the month's risk multiplier. Runs own independent generators derived from
//! `(seed, run_index)`, so an ensemble is reproducible for a given seed whatever executor
//! or thread count evaluates it.

use std::time::{Duration, Instant};

use erw_core::{Error, Posterior, Result, RunExecutor, SimulationRun};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::executor::{RayonExecutor, SequentialExecutor};
use crate::latent;
use crate::risk::RiskMultiplierSource;

/// Default projection horizon.
pub const DEFAULT_HORIZON_MONTHS: usize = 120;

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of independent runs (>= 1).
    pub n_runs: usize,
    /// Months simulated per run (>= 1).
    pub horizon_months: usize,
    /// Base seed; `None` draws one from the thread generator.
    pub seed: Option<u64>,
    /// Worker threads: 1 = sequential, 0 = rayon global pool, N = dedicated pool.
    pub n_threads: usize,
    /// Keep the per-month removals of every run.
    pub record_trajectories: bool,
    /// Wall-clock budget for the whole ensemble.
    #[serde(skip)]
    pub time_budget: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_runs: 1000,
            horizon_months: DEFAULT_HORIZON_MONTHS,
            seed: None,
            n_threads: 0,
            record_trajectories: false,
            time_budget: None,
        }
    }
}

impl SimulationConfig {
    /// `n_runs` runs over the default horizon.
    pub fn new(n_runs: usize) -> Self {
        Self { n_runs, ..Self::default() }
    }

    /// Fix the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn executor(&self) -> Box<dyn RunExecutor> {
        if self.n_threads == 1 {
            Box::new(SequentialExecutor)
        } else {
            Box::new(RayonExecutor::new(self.n_threads))
        }
    }
}

/// Ordered output of one `simulate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEnsemble {
    /// Base seed the runs were derived from.
    pub seed: u64,
    /// Months per run.
    pub horizon_months: usize,
    /// Runs in index order.
    pub runs: Vec<SimulationRun>,
}

impl SimulationEnsemble {
    /// Totals in run order.
    pub fn totals(&self) -> Vec<f64> {
        self.runs.iter().map(|r| r.total).collect()
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the ensemble has no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Generator for run `run_index` of an ensemble seeded with `seed`.
pub fn run_rng(seed: u64, run_index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(run_index as u64))
}

/// Simulate an ensemble; the executor follows `config.n_threads`.
///
/// `application_rate` (A) and `chemistry_factor` (K) are the configuration pair; either
/// being `None` fails with [`Error::MissingConfigurationParameter`]. The posterior is
/// checked before any sampling.
pub fn simulate(
    posterior: &Posterior,
    application_rate: Option<f64>,
    chemistry_factor: Option<f64>,
    risk: Option<&RiskMultiplierSource>,
    config: &SimulationConfig,
) -> Result<SimulationEnsemble> {
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let executor = config.executor();
    simulate_with_executor(
        posterior,
        application_rate,
        chemistry_factor,
        risk,
        config,
        seed,
        executor.as_ref(),
    )
}

/// Like [`simulate`], with the base seed drawn from `rng` (`config.seed` is ignored).
pub fn simulate_with_rng<R: Rng>(
    posterior: &Posterior,
    application_rate: Option<f64>,
    chemistry_factor: Option<f64>,
    risk: Option<&RiskMultiplierSource>,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<SimulationEnsemble> {
    let seed: u64 = rng.random();
    let executor = config.executor();
    simulate_with_executor(
        posterior,
        application_rate,
        chemistry_factor,
        risk,
        config,
        seed,
        executor.as_ref(),
    )
}

fn required(name: &str, value: Option<f64>) -> Result<f64> {
    let v = value.ok_or_else(|| Error::MissingConfigurationParameter(name.to_string()))?;
    if !v.is_finite() {
        return Err(Error::Validation(format!("{name} must be finite, got {v}")));
    }
    Ok(v)
}

/// Simulate with an explicit base seed and executor.
#[allow(clippy::too_many_arguments)]
pub fn simulate_with_executor(
    posterior: &Posterior,
    application_rate: Option<f64>,
    chemistry_factor: Option<f64>,
    risk: Option<&RiskMultiplierSource>,
    config: &SimulationConfig,
    seed: u64,
    executor: &dyn RunExecutor,
) -> Result<SimulationEnsemble> {
    let a = required("application_rate", application_rate)?;
    let k = required("chemistry_factor", chemistry_factor)?;
    posterior.validate()?;
    if config.n_runs == 0 {
        return Err(Error::Validation("n_runs must be >= 1".to_string()));
    }
    if config.horizon_months == 0 {
        return Err(Error::Validation("horizon_months must be >= 1".to_string()));
    }

    let horizon = config.horizon_months;
    let record = config.record_trajectories;
    let params = posterior.parameters;
    let sd_r = posterior.eta_r_var.sqrt();
    let sd_phi = posterior.eta_phi_var.sqrt();
    let deadline = config.time_budget.map(|b| Instant::now() + b);

    let run = |run_index: usize| -> Result<SimulationRun> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::BudgetExceeded(format!(
                "simulation time budget exhausted before run {run_index}"
            )));
        }

        let mut rng = run_rng(seed, run_index);
        let z0_r: f64 = rng.sample(StandardNormal);
        let z0_phi: f64 = rng.sample(StandardNormal);
        let mut eta_r = posterior.eta_r_mean + sd_r * z0_r;
        let mut eta_phi = posterior.eta_phi_mean + sd_phi * z0_phi;

        let mut monthly = record.then(|| Vec::with_capacity(horizon));
        let mut total = 0.0;
        for t in 0..horizon {
            let z_r: f64 = rng.sample(StandardNormal);
            let z_phi: f64 = rng.sample(StandardNormal);
            (eta_r, eta_phi) = latent::step(&params, eta_r, eta_phi, z_r, z_phi);

            let mut n_t = latent::monthly_removal(a, k, eta_r, eta_phi);
            if let Some(source) = risk {
                n_t *= source.multiplier(t);
            }
            total += n_t;
            if let Some(m) = monthly.as_mut() {
                m.push(n_t);
            }
        }

        Ok(SimulationRun { run_index, total, monthly })
    };

    let runs = executor.map_runs(config.n_runs, &run)?;
    log::debug!(
        "simulated {} runs x {} months (seed={seed}, executor={})",
        runs.len(),
        horizon,
        executor.name()
    );

    Ok(SimulationEnsemble { seed, horizon_months: horizon, runs })
}
