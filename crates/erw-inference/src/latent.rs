//! Latent weathering model: two scalar channels in log / logit space.
//!
//! State transition (per month):
//! `eta_r[t]   = eta_r[t-1]   + alpha_r   + sigma_r   * z_r`
//! `eta_phi[t] = eta_phi[t-1] + alpha_phi + sigma_phi * z_phi`
//!
//! Observables: `r = exp(eta_r)`, `phi = logistic(eta_phi)`.
//! Lab observation: `y ~ N(exp(eta_r), sigma_obs^2)`; `phi` is never observed.

use erw_core::ModelParameters;

/// Stable logistic: `1 / (1 + exp(-x))`, one `exp(-|x|)` per call.
#[inline]
pub fn logistic(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    let recip = 1.0 / (1.0 + e);
    if x >= 0.0 { recip } else { e * recip }
}

/// Weathering rate `r = exp(eta_r)`.
#[inline]
pub fn rate(eta_r: f64) -> f64 {
    eta_r.exp()
}

/// Weathering efficiency `phi = logistic(eta_phi)`.
#[inline]
pub fn efficiency(eta_phi: f64) -> f64 {
    logistic(eta_phi)
}

/// Lab observation function linearized at `eta_r`: returns `(h, dh/deta_r)`.
///
/// For `h = exp(eta_r)` the Jacobian equals `h` itself.
#[inline]
pub fn observe(eta_r: f64) -> (f64, f64) {
    let h = rate(eta_r);
    (h, h)
}

/// One stochastic month for both channels given standard-normal variates.
#[inline]
pub fn step(
    params: &ModelParameters,
    eta_r: f64,
    eta_phi: f64,
    z_r: f64,
    z_phi: f64,
) -> (f64, f64) {
    (
        eta_r + params.alpha_r + params.sigma_r * z_r,
        eta_phi + params.alpha_phi + params.sigma_phi * z_phi,
    )
}

/// Monthly removal `A * K * r * phi`.
#[inline]
pub fn monthly_removal(
    application_rate: f64,
    chemistry_factor: f64,
    eta_r: f64,
    eta_phi: f64,
) -> f64 {
    application_rate * chemistry_factor * rate(eta_r) * efficiency(eta_phi)
}
