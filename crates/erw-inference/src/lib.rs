//! # erw-inference
//!
//! Numerical engines for erwstat.
//!
//! This crate provides:
//! - the latent weathering model (log-rate and logit-efficiency random walks)
//! - an EKF likelihood and its maximum-likelihood fit under box constraints
//! - Monte Carlo projection of cumulative CO₂ removal under risk multipliers
//! - ensemble summaries with a target-hit probability
//!
//! Nothing here performs I/O; inputs and outputs are plain values from `erw-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Extended Kalman filter forward pass.
pub mod ekf;
/// Maximum-likelihood estimation of the latent model.
pub mod estimator;
/// Sequential and rayon run executors.
pub mod executor;
/// Latent model equations.
pub mod latent;
/// Bounded quasi-Newton optimizer.
pub mod optimizer;
/// Risk multiplier sources.
pub mod risk;
/// Monte Carlo trajectory simulation.
pub mod simulate;
/// Ensemble summaries.
pub mod summary;

pub use ekf::{EkfPass, TraceStep, filter_trace, forward_pass, prior_from_observations};
pub use estimator::{StateEstimator, fit, fit_with_config, fit_with_minimizer};
pub use executor::{RayonExecutor, SequentialExecutor};
pub use optimizer::{
    BoundedMinimizer, LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig,
};
pub use risk::{RiskMultiplierSource, RiskProfiles};
pub use simulate::{
    DEFAULT_HORIZON_MONTHS, SimulationConfig, SimulationEnsemble, simulate, simulate_with_executor,
    simulate_with_rng,
};
pub use summary::{
    DEFAULT_TARGET_FALLBACK, DEFAULT_TARGET_MULTIPLIER, TargetPolicy, quantile_linear_sorted,
    summarize,
};
