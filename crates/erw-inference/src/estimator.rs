//! Maximum-likelihood fit of the latent weathering model.
//!
//! The EKF negative log-likelihood over
//! `[alpha_r, alpha_phi, sigma_r, sigma_phi, sigma_obs]` is minimized inside
//! [`PARAMETER_BOUNDS`]. The returned posterior is the filter's end-of-series belief at
//! the optimum (not a smoothed estimate).

use std::sync::atomic::{AtomicUsize, Ordering};

use erw_core::{
    DataSummary, Error, FieldObservation, FitReport, LabObservation, LatentPrior, ModelParameters,
    PARAMETER_BOUNDS, Result,
};

use crate::ekf;
use crate::optimizer::{BoundedMinimizer, LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};

/// Starting scale of both process noises.
const INITIAL_PROCESS_SIGMA: f64 = 0.1;
/// Observation noise starts at this fraction of the uptake spread.
const INITIAL_OBS_FRACTION: f64 = 0.1;

/// Negative log-likelihood as an optimizer objective; counts every evaluation.
struct EkfObjective<'a> {
    prior: LatentPrior,
    lab: &'a [LabObservation],
    evaluations: AtomicUsize,
}

impl ObjectiveFunction for EkfObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let params = ModelParameters::from_slice(params)?;
        Ok(ekf::negative_log_likelihood(&params, &self.prior, self.lab))
    }
}

/// Population standard deviation.
fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn check_finite(lab: &[LabObservation], field: Option<&[FieldObservation]>) -> Result<()> {
    if let Some((i, obs)) =
        lab.iter().enumerate().find(|(_, o)| !(o.time_months.is_finite() && o.uptake.is_finite()))
    {
        return Err(Error::Validation(format!(
            "lab record {i} is not finite (time={}, uptake={})",
            obs.time_months, obs.uptake
        )));
    }
    if let Some((i, w)) = field.unwrap_or_default().iter().enumerate().find(|(_, w)| {
        !(w.window_start.is_finite() && w.window_end.is_finite() && w.removed.is_finite())
    }) {
        return Err(Error::Validation(format!(
            "field record {i} is not finite (removed={})",
            w.removed
        )));
    }
    Ok(())
}

/// Initial optimizer vector: zero drifts, 0.1 process noise, 10% of the uptake spread.
pub fn initial_parameters(lab: &[LabObservation]) -> Result<ModelParameters> {
    if lab.is_empty() {
        return Err(Error::NoObservations);
    }
    let uptakes: Vec<f64> = lab.iter().map(|o| o.uptake).collect();
    Ok(ModelParameters {
        alpha_r: 0.0,
        alpha_phi: 0.0,
        sigma_r: INITIAL_PROCESS_SIGMA,
        sigma_phi: INITIAL_PROCESS_SIGMA,
        sigma_obs: INITIAL_OBS_FRACTION * population_std(&uptakes),
    })
}

/// Fit with the default [`LbfgsbOptimizer`] settings.
///
/// `lab` is consumed in the given order; duplicate or unsorted times are not rejected.
/// `field` only moves the `eta_phi` prior.
pub fn fit(lab: &[LabObservation], field: Option<&[FieldObservation]>) -> Result<FitReport> {
    fit_with_config(lab, field, &OptimizerConfig::default())
}

/// Fit with explicit optimizer settings (iteration and time budgets).
pub fn fit_with_config(
    lab: &[LabObservation],
    field: Option<&[FieldObservation]>,
    config: &OptimizerConfig,
) -> Result<FitReport> {
    fit_with_minimizer(&LbfgsbOptimizer::new(config.clone()), lab, field)
}

/// Fit through any [`BoundedMinimizer`].
pub fn fit_with_minimizer(
    minimizer: &dyn BoundedMinimizer,
    lab: &[LabObservation],
    field: Option<&[FieldObservation]>,
) -> Result<FitReport> {
    let prior = ekf::prior_from_observations(lab, field)?;
    check_finite(lab, field)?;
    log::debug!(
        "EKF prior: eta_r0={:.4} eta_phi0={:.4} ({} lab, {} field records)",
        prior.eta_r_mean,
        prior.eta_phi_mean,
        lab.len(),
        field.map_or(0, <[_]>::len)
    );

    let init = initial_parameters(lab)?;
    let objective = EkfObjective { prior, lab, evaluations: AtomicUsize::new(0) };
    let result = minimizer.minimize(&objective, &init.to_vec(), &PARAMETER_BOUNDS)?;

    if !result.converged {
        log::warn!("EKF fit did not converge: {}", result.message);
        return Err(if result.budget_exhausted {
            Error::BudgetExceeded(result.message)
        } else {
            Error::OptimizerDidNotConverge(result.message)
        });
    }

    let parameters = ModelParameters::from_slice(&result.parameters)?;
    let pass = ekf::forward_pass(&parameters, &prior, lab);
    log::debug!(
        "EKF fit: nll={:.6} after {} iterations ({})",
        -pass.log_likelihood,
        result.n_iter,
        result.message
    );

    Ok(FitReport {
        parameters,
        posterior: pass.posterior(),
        prior,
        nll: -pass.log_likelihood,
        n_iter: result.n_iter,
        n_fev: objective.evaluations.load(Ordering::Relaxed),
        message: result.message,
        data_summary: DataSummary {
            lab_records: lab.len(),
            field_records: field.map_or(0, <[_]>::len),
        },
    })
}

/// Reusable estimator holding optimizer settings.
#[derive(Debug, Clone, Default)]
pub struct StateEstimator {
    config: OptimizerConfig,
}

impl StateEstimator {
    /// Create an estimator with the given optimizer settings.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimizer settings.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// See [`fit_with_config`].
    pub fn fit(
        &self,
        lab: &[LabObservation],
        field: Option<&[FieldObservation]>,
    ) -> Result<FitReport> {
        fit_with_config(lab, field, &self.config)
    }
}
