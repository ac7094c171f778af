//! Bounded quasi-Newton optimization.
//!
//! The estimator only sees the [`BoundedMinimizer`] interface (objective, initial guess,
//! box bounds, iteration / time budget). The backend shipped here is a projected
//! limited-memory BFGS: two-loop recursion on curvature-checked history pairs, descent
//! restricted to the free variables, and a weak-Wolfe line search along the projected
//! path. The Wolfe curvature test keeps every stored pair informative, so the initial
//! Hessian scale follows the latest accepted step.

use erw_core::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Sufficient-decrease constant for the Armijo test.
const ARMIJO_C1: f64 = 1e-4;
/// Curvature constant of the weak Wolfe test.
const WOLFE_C2: f64 = 0.9;
/// Trial points per line search.
const MAX_LINE_SEARCH: usize = 60;
/// History pairs with `s·y` below this are dropped (curvature condition).
const MIN_CURVATURE: f64 = 1e-10;

/// Configuration for the L-BFGS-B optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the infinity norm of the projected gradient
    pub tol: f64,
    /// Convergence tolerance for the relative objective decrease per iteration
    pub ftol: f64,
    /// Number of corrections kept for the inverse Hessian approximation
    pub m: usize,
    /// Optional wall-clock budget; exhausting it ends the run unconverged
    pub time_budget: Option<Duration>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-5, ftol: 2.2e-9, m: 10, time_budget: None }
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters found (always inside the bounds)
    pub parameters: Vec<f64>,
    /// Function value at `parameters`
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations issued by the line search.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Whether the time budget ran out
    pub budget_exhausted: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={}, \
             message={:?})",
            self.fval,
            self.n_iter,
            self.n_fev,
            self.n_gev,
            self.converged,
            self.message
        )
    }
}

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`; central differences unless overridden.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut shifted = params.to_vec();
        for i in 0..params.len() {
            let h = 1e-8 * params[i].abs().max(1.0);
            shifted[i] = params[i] + h;
            let f_plus = self.eval(&shifted)?;
            shifted[i] = params[i] - h;
            let f_minus = self.eval(&shifted)?;
            shifted[i] = params[i];
            grad[i] = (f_plus - f_minus) / (2.0 * h);
        }
        Ok(grad)
    }
}

/// Minimal interface the estimator needs from a numerical backend.
pub trait BoundedMinimizer: Send + Sync {
    /// Minimize `objective` from `init` subject to `bounds[i].0 <= x[i] <= bounds[i].1`.
    ///
    /// Non-convergence is reported through [`OptimizationResult::converged`], not as `Err`.
    /// `Err` is reserved for invalid input or a non-finite objective/gradient.
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult>;
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Gradient with components that push against an active bound set to zero.
fn projected_gradient(x: &[f64], grad: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(grad)
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| {
            if (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0) { 0.0 } else { gi }
        })
        .collect()
}

/// Limited-memory history of `(s, y, 1 / s·y)`, oldest first.
struct History {
    pairs: VecDeque<(Vec<f64>, Vec<f64>, f64)>,
    capacity: usize,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self { pairs: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    fn push(&mut self, s: Vec<f64>, y: Vec<f64>) {
        let sy = dot(&s, &y);
        if sy <= MIN_CURVATURE {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y, 1.0 / sy));
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }

    /// `-H g` via the two-loop recursion with `H0 = (s·y / y·y) I`.
    fn descent_direction(&self, grad: &[f64]) -> Vec<f64> {
        let mut q = grad.to_vec();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for (s, y, rho) in self.pairs.iter().rev() {
            let a = rho * dot(s, &q);
            for (qj, yj) in q.iter_mut().zip(y) {
                *qj -= a * yj;
            }
            alphas.push(a);
        }

        let gamma = match self.pairs.back() {
            Some((s, y, _)) => {
                let yy = dot(y, y);
                if yy > 1e-30 { dot(s, y) / yy } else { 1.0 }
            }
            None => 1.0,
        };
        for qj in q.iter_mut() {
            *qj *= gamma;
        }

        for ((s, y, rho), a) in self.pairs.iter().zip(alphas.iter().rev()) {
            let b = rho * dot(y, &q);
            for (qj, sj) in q.iter_mut().zip(s) {
                *qj += (a - b) * sj;
            }
        }

        q.iter().map(|v| -v).collect()
    }
}

/// Accepted line-search point.
struct Trial {
    x: Vec<f64>,
    step: Vec<f64>,
    f: f64,
    grad: Vec<f64>,
}

/// Evaluation counters shared by the outer loop and the line search.
#[derive(Default)]
struct Counters {
    fev: usize,
    gev: usize,
}

/// Weak-Wolfe search along the projected path `P(x + t d)`.
///
/// Bisects once a trial fails sufficient decrease, doubles `t` while only the curvature
/// test fails. When the trial budget runs out the lowest Armijo point is returned, so an
/// accepted pair may still be rejected by the history's curvature guard.
#[allow(clippy::too_many_arguments)]
fn line_search(
    objective: &dyn ObjectiveFunction,
    bounds: &[(f64, f64)],
    x: &[f64],
    f: f64,
    g: &[f64],
    dir: &[f64],
    t0: f64,
    counters: &mut Counters,
) -> Result<Option<Trial>> {
    let (mut lo, mut hi) = (0.0f64, f64::INFINITY);
    let mut t = t0;
    let mut best: Option<Trial> = None;
    let mut last_x: Option<Vec<f64>> = None;

    for _ in 0..MAX_LINE_SEARCH {
        let trial: Vec<f64> = x.iter().zip(dir).map(|(xi, di)| xi + t * di).collect();
        let x_new = clamp_params(&trial, bounds);
        if hi.is_infinite() && last_x.as_ref() == Some(&x_new) {
            // Every moving coordinate is pinned; expanding further changes nothing.
            break;
        }
        let step: Vec<f64> = x_new.iter().zip(x).map(|(a, b)| a - b).collect();
        if step.iter().all(|s| s.abs() <= f64::EPSILON) {
            break;
        }

        let slope = dot(g, &step);
        let f_new = objective.eval(&x_new)?;
        counters.fev += 1;

        if slope >= 0.0 || !f_new.is_finite() || f_new > f + ARMIJO_C1 * slope {
            hi = t;
        } else {
            let g_new = objective.gradient(&x_new)?;
            counters.gev += 1;
            if g_new.iter().any(|v| !v.is_finite()) {
                return Err(Error::Computation(
                    "gradient is not finite during line search".into(),
                ));
            }
            let curvature_ok = dot(&g_new, &step) >= WOLFE_C2 * slope;
            let candidate = Trial { x: x_new.clone(), step, f: f_new, grad: g_new };
            if curvature_ok {
                return Ok(Some(candidate));
            }
            if best.as_ref().is_none_or(|b| candidate.f < b.f) {
                best = Some(candidate);
            }
            lo = t;
        }

        last_x = Some(x_new);
        t = if hi.is_finite() { 0.5 * (lo + hi) } else { 2.0 * t };
    }

    Ok(best)
}

/// Projected L-BFGS with box constraints
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create new optimizer with given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl BoundedMinimizer for LbfgsbOptimizer {
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init.len(),
                bounds.len()
            )));
        }
        if let Some((i, _)) = bounds.iter().enumerate().find(|(_, (lo, hi))| !(lo <= hi)) {
            return Err(Error::Validation(format!("invalid bounds for parameter {i}")));
        }
        if init.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("initial parameters must be finite".to_string()));
        }

        let cfg = &self.config;
        let deadline = cfg.time_budget.map(|b| Instant::now() + b);
        let mut counters = Counters::default();

        let mut x = clamp_params(init, bounds);
        let mut f = objective.eval(&x)?;
        counters.fev += 1;
        if !f.is_finite() {
            return Err(Error::Computation(format!(
                "objective is not finite at the initial point: {f}"
            )));
        }
        let mut g = objective.gradient(&x)?;
        counters.gev += 1;
        if g.iter().any(|v| !v.is_finite()) {
            return Err(Error::Computation("gradient is not finite at the initial point".into()));
        }

        let mut history = History::new(cfg.m);
        let mut n_iter = 0u64;

        let finish = |x: Vec<f64>,
                      f: f64,
                      n_iter: u64,
                      counters: &Counters,
                      converged: bool,
                      budget: bool,
                      message: String| {
            OptimizationResult {
                parameters: x,
                fval: f,
                n_iter,
                n_fev: counters.fev,
                n_gev: counters.gev,
                converged,
                budget_exhausted: budget,
                message,
            }
        };

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let msg = format!("time budget exhausted after {n_iter} iterations");
                return Ok(finish(x, f, n_iter, &counters, false, true, msg));
            }

            let pg = projected_gradient(&x, &g, bounds);
            let pg_norm = pg.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if pg_norm <= cfg.tol {
                let msg = "projected gradient below tolerance".to_string();
                return Ok(finish(x, f, n_iter, &counters, true, false, msg));
            }
            if n_iter >= cfg.max_iter {
                let msg = format!("maximum iterations ({}) reached", cfg.max_iter);
                return Ok(finish(x, f, n_iter, &counters, false, false, msg));
            }

            // Free-variable quasi-Newton direction; fall back to projected steepest descent.
            let mut dir = history.descent_direction(&pg);
            for (di, &pgi) in dir.iter_mut().zip(&pg) {
                if pgi == 0.0 {
                    *di = 0.0;
                }
            }
            if !(dot(&g, &dir) < 0.0) {
                history.clear();
                dir = pg.iter().map(|v| -v).collect();
            }

            let t0 =
                if history.is_empty() { (1.0 / dot(&dir, &dir).sqrt()).min(1.0) } else { 1.0 };
            let accepted = line_search(objective, bounds, &x, f, &g, &dir, t0, &mut counters)?;

            let Some(trial) = accepted else {
                if !history.is_empty() {
                    log::debug!(
                        "line search failed at iteration {n_iter}; restarting from steepest descent"
                    );
                    history.clear();
                    continue;
                }
                let msg = format!(
                    "line search failed along the projected gradient (|pg| = {pg_norm:.3e})"
                );
                return Ok(finish(x, f, n_iter, &counters, false, false, msg));
            };

            let y: Vec<f64> = trial.grad.iter().zip(&g).map(|(a, b)| a - b).collect();
            history.push(trial.step, y);

            let rel_decrease = (f - trial.f) / f.abs().max(trial.f.abs()).max(1.0);
            x = trial.x;
            f = trial.f;
            g = trial.grad;
            n_iter += 1;

            if rel_decrease <= cfg.ftol {
                let msg = "relative reduction of objective below ftol".to_string();
                return Ok(finish(x, f, n_iter, &counters, true, false, msg));
            }
        }
    }
}
