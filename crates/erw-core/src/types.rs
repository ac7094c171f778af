//! Common data types for erwstat

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lower bound applied to every noise scale before it enters the filter.
pub const SIGMA_FLOOR: f64 = 1e-6;

/// Upper bound for noise scales during fitting.
pub const SIGMA_CEIL: f64 = 10.0;

/// Stable names of the fitted parameter vector, in optimizer order.
pub const PARAMETER_NAMES: [&str; 5] =
    ["alpha_r", "alpha_phi", "sigma_r", "sigma_phi", "sigma_obs"];

/// Box constraints for the fitted parameter vector, in optimizer order.
pub const PARAMETER_BOUNDS: [(f64, f64); 5] = [
    (-1.0, 1.0),
    (-1.0, 1.0),
    (SIGMA_FLOOR, SIGMA_CEIL),
    (SIGMA_FLOOR, SIGMA_CEIL),
    (SIGMA_FLOOR, SIGMA_CEIL),
];

/// One laboratory CO₂-uptake reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabObservation {
    /// Months since the start of the experiment.
    pub time_months: f64,
    /// Uptake as a mass ratio (t CO₂ per t rock).
    #[serde(alias = "co2_uptake_t_per_t")]
    pub uptake: f64,
}

impl LabObservation {
    /// Create a new lab observation.
    pub fn new(time_months: f64, uptake: f64) -> Self {
        Self { time_months, uptake }
    }
}

/// One field removal window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    /// Window start (months).
    pub window_start: f64,
    /// Window end (months).
    pub window_end: f64,
    /// Removed CO₂ over the window (mass per area).
    #[serde(alias = "co2_removed_t_ha")]
    pub removed: f64,
}

impl FieldObservation {
    /// Create a new field observation.
    pub fn new(window_start: f64, window_end: f64, removed: f64) -> Self {
        Self { window_start, window_end, removed }
    }
}

/// Fitted drift and noise parameters of the two latent channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Monthly drift of the log-rate channel.
    pub alpha_r: f64,
    /// Monthly drift of the logit-efficiency channel.
    pub alpha_phi: f64,
    /// Process noise scale of the log-rate channel.
    pub sigma_r: f64,
    /// Process noise scale of the logit-efficiency channel.
    pub sigma_phi: f64,
    /// Lab observation noise scale.
    pub sigma_obs: f64,
}

impl ModelParameters {
    /// Build from an optimizer vector `[alpha_r, alpha_phi, sigma_r, sigma_phi, sigma_obs]`.
    pub fn from_slice(v: &[f64]) -> Result<Self> {
        if v.len() != PARAMETER_NAMES.len() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                PARAMETER_NAMES.len(),
                v.len()
            )));
        }
        Ok(Self { alpha_r: v[0], alpha_phi: v[1], sigma_r: v[2], sigma_phi: v[3], sigma_obs: v[4] })
    }

    /// Optimizer-order vector.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.alpha_r, self.alpha_phi, self.sigma_r, self.sigma_phi, self.sigma_obs]
    }

    /// Copy with every noise scale raised to at least [`SIGMA_FLOOR`].
    pub fn floored(&self) -> Self {
        Self {
            sigma_r: self.sigma_r.max(SIGMA_FLOOR),
            sigma_phi: self.sigma_phi.max(SIGMA_FLOOR),
            sigma_obs: self.sigma_obs.max(SIGMA_FLOOR),
            ..*self
        }
    }
}

/// Gaussian belief over both latent channels at the start of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatentPrior {
    /// Prior mean of `eta_r`.
    pub eta_r_mean: f64,
    /// Prior variance of `eta_r`.
    pub eta_r_var: f64,
    /// Prior mean of `eta_phi`.
    pub eta_phi_mean: f64,
    /// Prior variance of `eta_phi`.
    pub eta_phi_var: f64,
}

/// End-of-series filter belief together with the fitted parameters.
///
/// This is a plain value: persistence and "latest posterior" lookup belong to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    /// Filtered mean of `eta_r` after the last observation.
    pub eta_r_mean: f64,
    /// Filtered variance of `eta_r` after the last observation.
    pub eta_r_var: f64,
    /// Propagated mean of `eta_phi` after the last observation.
    pub eta_phi_mean: f64,
    /// Propagated variance of `eta_phi` after the last observation.
    pub eta_phi_var: f64,
    /// Fitted parameters.
    pub parameters: ModelParameters,
}

impl Posterior {
    /// Check that the posterior can seed a simulation.
    ///
    /// Means must be finite; variances and noise scales finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let p = &self.parameters;
        let means = [
            ("eta_r_mean", self.eta_r_mean),
            ("eta_phi_mean", self.eta_phi_mean),
            ("alpha_r", p.alpha_r),
            ("alpha_phi", p.alpha_phi),
        ];
        for (name, v) in means {
            if !v.is_finite() {
                return Err(Error::MissingOrIncompletePosterior(format!(
                    "{name} must be finite, got {v}"
                )));
            }
        }
        let scales = [
            ("eta_r_var", self.eta_r_var),
            ("eta_phi_var", self.eta_phi_var),
            ("sigma_r", p.sigma_r),
            ("sigma_phi", p.sigma_phi),
        ];
        for (name, v) in scales {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::MissingOrIncompletePosterior(format!(
                    "{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Persisted posterior shape in which every column may be null.
///
/// Convert with `Posterior::try_from(record)`; the first missing field is named in the
/// error. `sigma_obs` is not stored upstream and falls back to [`SIGMA_FLOOR`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosteriorRecord {
    /// See [`Posterior::eta_r_mean`].
    #[serde(default, alias = "eta_r0_mean")]
    pub eta_r_mean: Option<f64>,
    /// See [`Posterior::eta_r_var`].
    #[serde(default, alias = "eta_r0_var")]
    pub eta_r_var: Option<f64>,
    /// See [`Posterior::eta_phi_mean`].
    #[serde(default, alias = "eta_phi0_mean")]
    pub eta_phi_mean: Option<f64>,
    /// See [`Posterior::eta_phi_var`].
    #[serde(default, alias = "eta_phi0_var")]
    pub eta_phi_var: Option<f64>,
    /// See [`ModelParameters::alpha_r`].
    #[serde(default)]
    pub alpha_r: Option<f64>,
    /// See [`ModelParameters::alpha_phi`].
    #[serde(default)]
    pub alpha_phi: Option<f64>,
    /// See [`ModelParameters::sigma_r`].
    #[serde(default)]
    pub sigma_r: Option<f64>,
    /// See [`ModelParameters::sigma_phi`].
    #[serde(default)]
    pub sigma_phi: Option<f64>,
    /// See [`ModelParameters::sigma_obs`].
    #[serde(default)]
    pub sigma_obs: Option<f64>,
}

impl From<&Posterior> for PosteriorRecord {
    fn from(p: &Posterior) -> Self {
        Self {
            eta_r_mean: Some(p.eta_r_mean),
            eta_r_var: Some(p.eta_r_var),
            eta_phi_mean: Some(p.eta_phi_mean),
            eta_phi_var: Some(p.eta_phi_var),
            alpha_r: Some(p.parameters.alpha_r),
            alpha_phi: Some(p.parameters.alpha_phi),
            sigma_r: Some(p.parameters.sigma_r),
            sigma_phi: Some(p.parameters.sigma_phi),
            sigma_obs: Some(p.parameters.sigma_obs),
        }
    }
}

impl TryFrom<PosteriorRecord> for Posterior {
    type Error = Error;

    fn try_from(r: PosteriorRecord) -> Result<Self> {
        fn required(name: &str, v: Option<f64>) -> Result<f64> {
            v.ok_or_else(|| Error::MissingOrIncompletePosterior(format!("{name} is null")))
        }
        Ok(Posterior {
            eta_r_mean: required("eta_r_mean", r.eta_r_mean)?,
            eta_r_var: required("eta_r_var", r.eta_r_var)?,
            eta_phi_mean: required("eta_phi_mean", r.eta_phi_mean)?,
            eta_phi_var: required("eta_phi_var", r.eta_phi_var)?,
            parameters: ModelParameters {
                alpha_r: required("alpha_r", r.alpha_r)?,
                alpha_phi: required("alpha_phi", r.alpha_phi)?,
                sigma_r: required("sigma_r", r.sigma_r)?,
                sigma_phi: required("sigma_phi", r.sigma_phi)?,
                sigma_obs: r.sigma_obs.unwrap_or(SIGMA_FLOOR),
            },
        })
    }
}

/// Counts of the records that went into a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSummary {
    /// Number of lab observations.
    pub lab_records: usize,
    /// Number of field observations.
    pub field_records: usize,
}

/// Outcome of one maximum-likelihood fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Maximum-likelihood parameters.
    pub parameters: ModelParameters,
    /// End-of-series belief at the fitted parameters.
    pub posterior: Posterior,
    /// Prior the filter was seeded with.
    pub prior: LatentPrior,
    /// Negative log-likelihood at the optimum.
    pub nll: f64,
    /// Optimizer iterations.
    pub n_iter: u64,
    /// Objective evaluations (including finite-difference evaluations).
    pub n_fev: usize,
    /// Optimizer termination message.
    pub message: String,
    /// Input record counts.
    pub data_summary: DataSummary,
}

/// Total removal of a single Monte Carlo draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Position of the draw within its ensemble.
    pub run_index: usize,
    /// Sum of monthly removals over the horizon.
    pub total: f64,
    /// Per-month removals, only when trajectories were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Vec<f64>>,
}

/// Descriptive statistics of an ensemble of totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest total.
    pub min: f64,
    /// Largest total.
    pub max: f64,
    /// 5th percentile (linear interpolation).
    pub p5: f64,
    /// Median (linear interpolation).
    pub p50: f64,
    /// 95th percentile (linear interpolation).
    pub p95: f64,
    /// Number of totals summarized.
    pub count: usize,
    /// Target the hit probability refers to.
    pub target: f64,
    /// Fraction of totals at or above `target`.
    pub p_hit: f64,
}
