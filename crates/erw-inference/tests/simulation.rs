//! Properties of the Monte Carlo projection and its summary.

use std::collections::BTreeMap;

use erw_core::{Error, ModelParameters, Posterior, PosteriorRecord};
use erw_inference::latent::logistic;
use erw_inference::{
    RiskMultiplierSource, RiskProfiles, SimulationConfig, TargetPolicy, fit, simulate, summarize,
};
use serde_json::json;

fn posterior(eta_r_var: f64, eta_phi_var: f64, sigma: f64) -> Posterior {
    Posterior {
        eta_r_mean: -2.0,
        eta_r_var,
        eta_phi_mean: 0.4,
        eta_phi_var,
        parameters: ModelParameters {
            alpha_r: 0.0,
            alpha_phi: 0.0,
            sigma_r: sigma,
            sigma_phi: sigma,
            sigma_obs: 1e-6,
        },
    }
}

fn expected_deterministic_total(p: &Posterior, a: f64, k: f64, horizon: usize) -> f64 {
    horizon as f64 * a * k * p.eta_r_mean.exp() * logistic(p.eta_phi_mean)
}

#[test]
fn near_deterministic_run_matches_closed_form() {
    let p = posterior(0.0, 0.0, 1e-6);
    let cfg = SimulationConfig::new(1).with_seed(17);
    let ens = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap();
    assert_eq!(ens.len(), 1);
    assert_eq!(ens.horizon_months, 120);
    let expected = expected_deterministic_total(&p, 10.0, 0.5, 120);
    let total = ens.runs[0].total;
    assert!((total / expected - 1.0).abs() < 1e-3, "{total} vs {expected}");
}

#[test]
fn small_initial_spread_stays_near_closed_form() {
    let p = Posterior { eta_r_var: 0.01, ..posterior(0.0, 0.0, 1e-6) };
    let cfg = SimulationConfig::new(1).with_seed(17);
    let total = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap().runs[0].total;
    let ratio = total / expected_deterministic_total(&p, 10.0, 0.5, 120);
    // exp of a N(0, 0.01) draw
    assert!(ratio > 0.6 && ratio < 1.6, "ratio = {ratio}");
}

#[test]
fn seeded_simulation_is_reproducible() {
    let p = posterior(0.05, 0.1, 0.05);
    let cfg = SimulationConfig::new(200).with_seed(42);
    let a = simulate(&p, Some(25.0), Some(0.4), None, &cfg).unwrap();
    let sequential = SimulationConfig { n_threads: 1, ..cfg.clone() };
    let b = simulate(&p, Some(25.0), Some(0.4), None, &sequential).unwrap();
    assert_eq!(a.totals(), b.totals());

    let c = simulate(&p, Some(25.0), Some(0.4), None, &cfg.with_seed(43)).unwrap();
    assert_ne!(a.totals(), c.totals());
}

#[test]
fn unit_scalar_risk_is_a_no_op() {
    let p = posterior(0.05, 0.1, 0.05);
    let cfg = SimulationConfig::new(50).with_seed(8);
    let plain = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap();
    let unit = RiskMultiplierSource::Scalar(1.0);
    let scaled = simulate(&p, Some(10.0), Some(0.5), Some(&unit), &cfg).unwrap();
    assert_eq!(plain.totals(), scaled.totals());
}

#[test]
fn keyed_risk_doubles_first_month_only() {
    let p = posterior(0.05, 0.1, 0.05);
    let cfg =
        SimulationConfig { record_trajectories: true, ..SimulationConfig::new(5).with_seed(21) };
    let parameters = json!({"0": 2.0, "default": 1.0});
    let risk = RiskMultiplierSource::from_profile_json(&parameters).unwrap().unwrap();
    assert_eq!(
        risk,
        RiskMultiplierSource::Keyed { by_month: BTreeMap::from([(0, 2.0)]), default: Some(1.0) }
    );

    let plain = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap();
    let risky = simulate(&p, Some(10.0), Some(0.5), Some(&risk), &cfg).unwrap();
    for (a, b) in plain.runs.iter().zip(&risky.runs) {
        let (ma, mb) = (a.monthly.as_ref().unwrap(), b.monthly.as_ref().unwrap());
        assert_eq!(mb[0], 2.0 * ma[0]);
        assert_eq!(&ma[1..], &mb[1..]);
    }
}

#[test]
fn sequence_risk_clamps_to_last_element() {
    let p = posterior(0.0, 0.0, 1e-6);
    let cfg = SimulationConfig {
        record_trajectories: true,
        horizon_months: 6,
        ..SimulationConfig::new(1).with_seed(1)
    };
    let risk = RiskMultiplierSource::Sequence(vec![1.0, 0.5]);
    let plain = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap();
    let risky = simulate(&p, Some(10.0), Some(0.5), Some(&risk), &cfg).unwrap();
    let ma = plain.runs[0].monthly.as_ref().unwrap();
    let mb = risky.runs[0].monthly.as_ref().unwrap();
    assert_eq!(mb[0], ma[0]);
    for t in 1..6 {
        assert_eq!(mb[t], 0.5 * ma[t]);
    }
}

#[test]
fn unknown_profile_and_incomplete_posterior() {
    let profiles: RiskProfiles =
        serde_json::from_value(json!({"drought": {"multipliers": [0.7]}})).unwrap();
    assert!(matches!(profiles.resolve("monsoon"), Err(Error::UnknownRiskProfile(_))));

    let record =
        PosteriorRecord { eta_phi_mean: None, ..PosteriorRecord::from(&posterior(0.1, 0.1, 0.1)) };
    let err = Posterior::try_from(record).unwrap_err();
    assert_eq!(err.kind().as_str(), "missing_or_incomplete_posterior");
}

#[test]
fn summary_percentiles_ordered_and_p_hit_monotone() {
    let p = posterior(0.2, 0.3, 0.1);
    let cfg = SimulationConfig::new(500).with_seed(5);
    let ens = simulate(&p, Some(10.0), Some(0.5), None, &cfg).unwrap();
    let totals = ens.totals();

    let mut last_p_hit = f64::INFINITY;
    for target in [0.0, 5.0, 10.0, 20.0, 40.0, 80.0, 1e6] {
        let s = summarize(&totals, &TargetPolicy::explicit(target)).unwrap();
        assert!(s.p5 <= s.p50 && s.p50 <= s.p95);
        assert!(s.min <= s.p5 && s.p95 <= s.max);
        assert!(s.p_hit <= last_p_hit);
        last_p_hit = s.p_hit;
    }
    assert_eq!(last_p_hit, 0.0);
}

#[test]
fn summary_of_five_totals() {
    let s = summarize(&[10.0, 20.0, 30.0, 40.0, 50.0], &TargetPolicy::explicit(30.0)).unwrap();
    assert_eq!(s.p_hit, 0.6);
    assert_eq!(s.p50, 30.0);
}

#[test]
fn fit_then_simulate_then_summarize() {
    let lab: Vec<_> = [0.010, 0.012, 0.013, 0.015, 0.018, 0.019]
        .iter()
        .enumerate()
        .map(|(i, &y)| erw_core::LabObservation::new(i as f64 + 1.0, y))
        .collect();
    let report = fit(&lab, None).unwrap();
    let cfg = SimulationConfig { horizon_months: 24, ..SimulationConfig::new(100).with_seed(3) };
    let ens = simulate(&report.posterior, Some(20.0), Some(0.6), None, &cfg).unwrap();
    let policy = TargetPolicy::from_application_rate(Some(20.0));
    let summary = summarize(&ens.totals(), &policy).unwrap();
    assert_eq!(summary.count, 100);
    assert!((summary.target - 6.0).abs() < 1e-12);
    assert!(summary.mean.is_finite() && summary.mean > 0.0);
}
