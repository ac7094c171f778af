//! Extended Kalman filter over the two latent weathering channels.
//!
//! Only the log-rate channel is observed (`y = exp(eta_r) + N(0, sigma_obs^2)`), so each
//! step predicts both channels and corrects `eta_r` alone. `eta_phi` is propagated and
//! never corrected. One observation is one filter step; the recorded times are carried
//! through to the trace but do not change the step size.

use erw_core::{
    Error, FieldObservation, LabObservation, LatentPrior, ModelParameters, Posterior, Result,
};
use serde::{Deserialize, Serialize};

use crate::latent;

/// Floor applied to the seeding uptake / field mean before taking the log.
pub const PRIOR_FLOOR: f64 = 1e-6;

/// Variance of both seeded prior channels.
pub const PRIOR_VARIANCE: f64 = 1.0;

/// Seed the filter from the data.
///
/// `eta_r` starts at `log(max(first uptake, 1e-6))`; `eta_phi` at `log(max(mean removed,
/// 1e-6))` when field windows exist and `0.0` otherwise. Both variances are `1.0`.
pub fn prior_from_observations(
    lab: &[LabObservation],
    field: Option<&[FieldObservation]>,
) -> Result<LatentPrior> {
    let first = lab.first().ok_or(Error::NoObservations)?;

    let eta_phi_mean = match field {
        Some(windows) if !windows.is_empty() => {
            let mean = windows.iter().map(|w| w.removed).sum::<f64>() / windows.len() as f64;
            mean.max(PRIOR_FLOOR).ln()
        }
        _ => 0.0,
    };

    Ok(LatentPrior {
        eta_r_mean: first.uptake.max(PRIOR_FLOOR).ln(),
        eta_r_var: PRIOR_VARIANCE,
        eta_phi_mean,
        eta_phi_var: PRIOR_VARIANCE,
    })
}

/// Running filter belief.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    /// Mean of `eta_r`.
    pub eta_r: f64,
    /// Variance of `eta_r`.
    pub p_r: f64,
    /// Mean of `eta_phi`.
    pub eta_phi: f64,
    /// Variance of `eta_phi`.
    pub p_phi: f64,
}

impl From<&LatentPrior> for FilterState {
    fn from(prior: &LatentPrior) -> Self {
        Self {
            eta_r: prior.eta_r_mean,
            p_r: prior.eta_r_var,
            eta_phi: prior.eta_phi_mean,
            p_phi: prior.eta_phi_var,
        }
    }
}

/// Intermediate quantities of one predict / correct cycle.
#[derive(Debug, Clone, Copy)]
struct StepOutput {
    eta_r_pred: f64,
    p_r_pred: f64,
    innovation: f64,
    innovation_var: f64,
    gain: f64,
}

impl StepOutput {
    fn log_likelihood(&self) -> f64 {
        let s = self.innovation_var;
        -0.5 * ((2.0 * std::f64::consts::PI * s).ln() + self.innovation * self.innovation / s)
    }
}

/// Advance `state` by one observation. `params` must already be floored.
#[inline]
fn ekf_step(params: &ModelParameters, state: &mut FilterState, y: f64) -> StepOutput {
    let eta_r_pred = state.eta_r + params.alpha_r;
    let p_r_pred = state.p_r + params.sigma_r * params.sigma_r;
    state.eta_phi += params.alpha_phi;
    state.p_phi += params.sigma_phi * params.sigma_phi;

    let (h, jac) = latent::observe(eta_r_pred);
    let innovation = y - h;
    let innovation_var = jac * jac * p_r_pred + params.sigma_obs * params.sigma_obs;
    let gain = jac * p_r_pred / innovation_var;

    state.eta_r = eta_r_pred + gain * innovation;
    // (1 - K H) P can round below zero when K H ~ 1.
    state.p_r = ((1.0 - gain * jac) * p_r_pred).max(0.0);

    StepOutput { eta_r_pred, p_r_pred, innovation, innovation_var, gain }
}

/// Result of one forward pass.
#[derive(Debug, Clone, Copy)]
pub struct EkfPass {
    /// Sum of per-observation Gaussian log-densities of the innovations.
    pub log_likelihood: f64,
    /// Belief after the last observation.
    pub final_state: FilterState,
    /// Parameters actually used (noise scales floored).
    pub parameters: ModelParameters,
}

impl EkfPass {
    /// End-of-series belief as a [`Posterior`] carrying the floored parameters.
    pub fn posterior(&self) -> Posterior {
        Posterior {
            eta_r_mean: self.final_state.eta_r,
            eta_r_var: self.final_state.p_r,
            eta_phi_mean: self.final_state.eta_phi,
            eta_phi_var: self.final_state.p_phi,
            parameters: self.parameters,
        }
    }
}

/// Run the filter over `lab` in input order and accumulate the log-likelihood.
pub fn forward_pass(
    params: &ModelParameters,
    prior: &LatentPrior,
    lab: &[LabObservation],
) -> EkfPass {
    let params = params.floored();
    let mut state = FilterState::from(prior);
    let mut log_likelihood = 0.0;
    for obs in lab {
        log_likelihood += ekf_step(&params, &mut state, obs.uptake).log_likelihood();
    }
    EkfPass { log_likelihood, final_state: state, parameters: params }
}

/// Negative log-likelihood of `lab` under `params`.
pub fn negative_log_likelihood(
    params: &ModelParameters,
    prior: &LatentPrior,
    lab: &[LabObservation],
) -> f64 {
    -forward_pass(params, prior, lab).log_likelihood
}

/// Per-observation filter diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Observation time (months), as supplied.
    pub time_months: f64,
    /// Observed uptake.
    pub observed: f64,
    /// Predicted `eta_r` before correction.
    pub predicted_mean: f64,
    /// Predicted `eta_r` variance.
    pub predicted_var: f64,
    /// `y - exp(eta_r_pred)`.
    pub innovation: f64,
    /// Innovation variance `S`.
    pub innovation_var: f64,
    /// Kalman gain.
    pub gain: f64,
    /// Corrected `eta_r`.
    pub filtered_mean: f64,
    /// Corrected `eta_r` variance.
    pub filtered_var: f64,
    /// Propagated `eta_phi`.
    pub eta_phi_mean: f64,
    /// Propagated `eta_phi` variance.
    pub eta_phi_var: f64,
}

/// Same recursion as [`forward_pass`], keeping every step.
pub fn filter_trace(
    params: &ModelParameters,
    prior: &LatentPrior,
    lab: &[LabObservation],
) -> Vec<TraceStep> {
    let params = params.floored();
    let mut state = FilterState::from(prior);
    lab.iter()
        .map(|obs| {
            let out = ekf_step(&params, &mut state, obs.uptake);
            TraceStep {
                time_months: obs.time_months,
                observed: obs.uptake,
                predicted_mean: out.eta_r_pred,
                predicted_var: out.p_r_pred,
                innovation: out.innovation,
                innovation_var: out.innovation_var,
                gain: out.gain,
                filtered_mean: state.eta_r,
                filtered_var: state.p_r,
                eta_phi_mean: state.eta_phi,
                eta_phi_var: state.p_phi,
            }
        })
        .collect()
}
