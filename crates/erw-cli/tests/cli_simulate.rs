use std::path::PathBuf;
use std::process::{Command, Output};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_erwstat"))
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture(name: &str) -> String {
    repo_root().join("tests/fixtures").join(name).to_string_lossy().into_owned()
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
}

fn simulate(extra: &[&str]) -> Output {
    let posterior = fixture("posterior.json");
    let mut args = vec![
        "simulate",
        "--posterior",
        posterior.as_str(),
        "--application-rate",
        "10",
        "--chemistry-factor",
        "0.5",
        "--n-runs",
        "64",
        "--seed",
        "7",
    ];
    args.extend_from_slice(extra);
    run(&args)
}

#[test]
fn simulate_contract_and_thread_independence() {
    let a = stdout_json(&simulate(&["--threads", "1"]));
    let b = stdout_json(&simulate(&["--threads", "4"]));

    assert_eq!(a["seed"], 7);
    assert_eq!(a["n_runs"], 64);
    assert_eq!(a["horizon_months"], 120);
    assert_eq!(a["n_totals"].as_array().unwrap().len(), 64);
    assert_eq!(a["n_totals"], b["n_totals"]);

    let s = &a["summary"];
    assert_eq!(s["count"], 64);
    assert!((s["target"].as_f64().unwrap() - 3.0).abs() < 1e-12);
    let (p5, p50, p95) =
        (s["p5"].as_f64().unwrap(), s["p50"].as_f64().unwrap(), s["p95"].as_f64().unwrap());
    assert!(p5 <= p50 && p50 <= p95);
}

#[test]
fn simulate_with_keyed_risk_profile() {
    let profiles = fixture("risk_profiles.json");
    let plain = stdout_json(&simulate(&["--keep-trajectories", "--horizon", "12"]));
    let risky = stdout_json(&simulate(&[
        "--keep-trajectories",
        "--horizon",
        "12",
        "--risk-profiles",
        profiles.as_str(),
        "--risk-profile",
        "first_month_boost",
    ]));

    let m_plain = plain["runs"][0]["monthly"].as_array().unwrap();
    let m_risky = risky["runs"][0]["monthly"].as_array().unwrap();
    assert_eq!(m_plain.len(), 12);
    assert_eq!(m_risky[0].as_f64().unwrap(), 2.0 * m_plain[0].as_f64().unwrap());
    assert_eq!(m_plain[1..], m_risky[1..]);
}

#[test]
fn simulate_unknown_profile() {
    let profiles = fixture("risk_profiles.json");
    let out = simulate(&["--risk-profiles", profiles.as_str(), "--risk-profile", "hurricane"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("error[unknown_risk_profile]"));
}

#[test]
fn simulate_requires_configuration_pair() {
    let posterior = fixture("posterior.json");
    let out = run(&[
        "simulate",
        "--posterior",
        posterior.as_str(),
        "--application-rate",
        "10",
        "--seed",
        "1",
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error[missing_configuration_parameter]"), "stderr={stderr}");
    assert!(stderr.contains("chemistry_factor"));
}

#[test]
fn simulate_rejects_incomplete_posterior() {
    let posterior = fixture("posterior_incomplete.json");
    let out = run(&[
        "simulate",
        "--posterior",
        posterior.as_str(),
        "--application-rate",
        "10",
        "--chemistry-factor",
        "0.5",
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error[missing_or_incomplete_posterior]"), "stderr={stderr}");
    assert!(stderr.contains("eta_phi_mean"));
}

#[test]
fn summarize_five_totals() {
    let totals = fixture("totals.json");
    let v = stdout_json(&run(&["summarize", "--input", totals.as_str(), "--target", "30"]));
    assert_eq!(v["p_hit"].as_f64().unwrap(), 0.6);
    assert_eq!(v["p50"].as_f64().unwrap(), 30.0);
    assert_eq!(v["count"], 5);

    // No target, no application rate: fallback target of 10 -> every total hits.
    let v = stdout_json(&run(&["summarize", "--input", totals.as_str()]));
    assert_eq!(v["target"].as_f64().unwrap(), 10.0);
    assert_eq!(v["p_hit"].as_f64().unwrap(), 1.0);
}
