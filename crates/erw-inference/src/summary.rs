//! Descriptive statistics and target-hit probability of an ensemble of totals.

use erw_core::{Error, Result, SummaryStatistics};
use serde::{Deserialize, Serialize};

/// Fraction of the application rate used as target when none is given.
pub const DEFAULT_TARGET_MULTIPLIER: f64 = 0.3;

/// Target used when neither an explicit target nor the application rate is known.
pub const DEFAULT_TARGET_FALLBACK: f64 = 10.0;

/// How the hit-probability target is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetPolicy {
    /// Explicit target; wins when set.
    pub explicit: Option<f64>,
    /// Application rate of the configuration, if known.
    pub application_rate: Option<f64>,
    /// Target = `application_rate * multiplier` when no explicit target.
    pub multiplier: f64,
    /// Target when neither of the above is available.
    pub fallback: f64,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self {
            explicit: None,
            application_rate: None,
            multiplier: DEFAULT_TARGET_MULTIPLIER,
            fallback: DEFAULT_TARGET_FALLBACK,
        }
    }
}

impl TargetPolicy {
    /// Fixed target.
    pub fn explicit(target: f64) -> Self {
        Self { explicit: Some(target), ..Self::default() }
    }

    /// Target derived from the application rate (or the fallback when unknown).
    pub fn from_application_rate(application_rate: Option<f64>) -> Self {
        Self { application_rate, ..Self::default() }
    }

    /// Resolved target value.
    pub fn resolve(&self) -> f64 {
        match (self.explicit, self.application_rate) {
            (Some(t), _) => t,
            (None, Some(a)) => a * self.multiplier,
            (None, None) => self.fallback,
        }
    }
}

/// Quantile of sorted data with linear interpolation between closest ranks.
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            if frac == 0.0 {
                return sorted[lo];
            }
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        }
    }
}

/// Summarize `totals` against the target chosen by `policy`.
///
/// NaN totals (missing values) are skipped; infinite totals are kept and count against
/// the target like any other value. If nothing is left the call fails with
/// [`Error::EmptyEnsemble`].
pub fn summarize(totals: &[f64], policy: &TargetPolicy) -> Result<SummaryStatistics> {
    let mut sorted: Vec<f64> = totals.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.len() < totals.len() {
        log::warn!("skipping {} NaN totals", totals.len() - sorted.len());
    }
    if sorted.is_empty() {
        return Err(Error::EmptyEnsemble);
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let target = policy.resolve();
    let hits = sorted.iter().filter(|&&v| v >= target).count();

    Ok(SummaryStatistics {
        mean,
        std: var.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p5: quantile_linear_sorted(&sorted, 0.05),
        p50: quantile_linear_sorted(&sorted, 0.50),
        p95: quantile_linear_sorted(&sorted, 0.95),
        count: sorted.len(),
        target,
        p_hit: hits as f64 / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_five_totals() {
        let s = summarize(&[10.0, 20.0, 30.0, 40.0, 50.0], &TargetPolicy::explicit(30.0)).unwrap();
        assert_eq!(s.count, 5);
        assert_relative_eq!(s.p_hit, 0.6);
        assert_relative_eq!(s.p50, 30.0);
        assert_relative_eq!(s.mean, 30.0);
        assert_relative_eq!(s.std, 200.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(s.p5, 12.0, epsilon = 1e-12);
        assert_relative_eq!(s.p95, 48.0, epsilon = 1e-12);
        assert_eq!((s.min, s.max), (10.0, 50.0));
    }

    #[test]
    fn test_target_resolution() {
        assert_eq!(TargetPolicy::explicit(7.0).resolve(), 7.0);
        let from_rate = TargetPolicy::from_application_rate(Some(20.0));
        assert_relative_eq!(from_rate.resolve(), 6.0, epsilon = 1e-12);
        assert_eq!(TargetPolicy::from_application_rate(None).resolve(), DEFAULT_TARGET_FALLBACK);
        let both = TargetPolicy {
            explicit: Some(1.0),
            application_rate: Some(20.0),
            ..Default::default()
        };
        assert_eq!(both.resolve(), 1.0);
    }

    #[test]
    fn test_empty_and_nan() {
        assert!(matches!(summarize(&[], &TargetPolicy::default()), Err(Error::EmptyEnsemble)));
        assert!(matches!(
            summarize(&[f64::NAN], &TargetPolicy::default()),
            Err(Error::EmptyEnsemble)
        ));

        let s = summarize(&[1.0, f64::NAN, 3.0], &TargetPolicy::explicit(2.0)).unwrap();
        assert_eq!(s.count, 2);
        assert_relative_eq!(s.p_hit, 0.5);
    }

    #[test]
    fn test_infinite_total_counts_as_hit() {
        let s = summarize(&[1.0, 3.0, f64::INFINITY], &TargetPolicy::explicit(2.0)).unwrap();
        assert_eq!(s.count, 3);
        assert_relative_eq!(s.p_hit, 2.0 / 3.0);
        assert_eq!(s.p50, 3.0);
        assert_eq!(s.max, f64::INFINITY);
        assert_eq!(s.mean, f64::INFINITY);
    }

    #[test]
    fn test_single_total() {
        let s = summarize(&[4.2], &TargetPolicy::explicit(4.2)).unwrap();
        assert_eq!((s.p5, s.p50, s.p95), (4.2, 4.2, 4.2));
        assert_eq!(s.std, 0.0);
        assert_eq!(s.p_hit, 1.0);
    }

    #[test]
    fn test_quantile_edges() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_linear_sorted(&s, 0.0), 1.0);
        assert_eq!(quantile_linear_sorted(&s, 1.0), 5.0);
        assert_relative_eq!(quantile_linear_sorted(&s, 0.25), 2.0);
        assert!(quantile_linear_sorted(&[], 0.5).is_nan());
    }
}
