//! Input file loading for `erwstat` subcommands.

use anyhow::{Context, Result};
use erw_core::{Error, FieldObservation, LabObservation, Posterior, PosteriorRecord};
use erw_inference::RiskProfiles;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(Error::Io)
        .with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_slice(&bytes)
        .map_err(Error::Json)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

/// Lab records, in file order.
pub fn load_lab(path: &Path) -> Result<Vec<LabObservation>> {
    tracing::info!(path = %path.display(), "loading lab records");
    let lab: Vec<LabObservation> = read_json(path)?;
    tracing::info!(records = lab.len(), "lab records loaded");
    Ok(lab)
}

pub fn load_field(path: &Path) -> Result<Vec<FieldObservation>> {
    tracing::info!(path = %path.display(), "loading field records");
    read_json(path)
}

/// Posterior from either a fit report (`{"posterior": {...}}`), a nested posterior, or a
/// flat stored record with nullable columns.
pub fn load_posterior(path: &Path) -> Result<Posterior> {
    let value: Value = read_json(path)?;
    let value = match value.get("posterior") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let posterior = if value.get("parameters").is_some() {
        serde_json::from_value::<Posterior>(value)
            .map_err(Error::Json)
            .with_context(|| format!("posterior in {}", path.display()))?
    } else {
        let record: PosteriorRecord = serde_json::from_value(value)
            .map_err(Error::Json)
            .with_context(|| format!("posterior record in {}", path.display()))?;
        Posterior::try_from(record)?
    };
    Ok(posterior)
}

#[derive(Debug, Deserialize)]
struct StoredProfile {
    risk_id: String,
    #[serde(default)]
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProfilesFile {
    ById(RiskProfiles),
    Stored(Vec<StoredProfile>),
}

/// Risk profiles as `{id: parameters}` or `[{"risk_id", "parameters"}]`.
pub fn load_risk_profiles(path: &Path) -> Result<RiskProfiles> {
    let profiles = match read_json::<ProfilesFile>(path)? {
        ProfilesFile::ById(p) => p,
        ProfilesFile::Stored(list) => {
            let mut profiles = RiskProfiles::new();
            for p in list {
                profiles.insert(p.risk_id, p.parameters);
            }
            profiles
        }
    };
    tracing::info!(profiles = profiles.len(), "risk profiles loaded");
    Ok(profiles)
}

#[derive(Debug, Deserialize)]
struct RunTotal {
    #[serde(alias = "n_total")]
    total: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalsFile {
    Plain(Vec<Option<f64>>),
    Runs(Vec<RunTotal>),
    Ensemble { runs: Vec<RunTotal> },
    Simulation { n_totals: Vec<Option<f64>> },
}

/// Totals from a bare array, stored run rows, or `simulate` output. Nulls become NaN
/// and are skipped by the summarizer.
pub fn load_totals(path: &Path) -> Result<Vec<f64>> {
    let totals = match read_json::<TotalsFile>(path)? {
        TotalsFile::Plain(v) | TotalsFile::Simulation { n_totals: v } => v,
        TotalsFile::Runs(runs) | TotalsFile::Ensemble { runs } => {
            runs.into_iter().map(|r| r.total).collect()
        }
    };
    Ok(totals.into_iter().map(|t| t.unwrap_or(f64::NAN)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_tmp(name: &str, contents: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir()
            .join(format!("erwstat_{}_{}_{}", std::process::id(), nanos, name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn totals_shapes() {
        let p = write_tmp("plain.json", "[1.0, null, 3.0]");
        let t = load_totals(&p).unwrap();
        assert_eq!(t.len(), 3);
        assert!(t[1].is_nan());

        let p = write_tmp("runs.json", r#"[{"run_index": 0, "n_total": 2.5}]"#);
        assert_eq!(load_totals(&p).unwrap(), vec![2.5]);

        let p = write_tmp("sim.json", r#"{"seed": 1, "runs": [{"run_index": 0, "total": 4.0}]}"#);
        assert_eq!(load_totals(&p).unwrap(), vec![4.0]);
    }

    #[test]
    fn posterior_shapes() {
        let flat = write_tmp(
            "flat.json",
            r#"{"eta_r0_mean": -2.0, "eta_r0_var": 0.01, "eta_phi0_mean": 0.0, "eta_phi0_var": 0.1,
                "alpha_r": 0.0, "alpha_phi": 0.0, "sigma_r": 0.01, "sigma_phi": 0.01}"#,
        );
        assert_eq!(load_posterior(&flat).unwrap().eta_r_mean, -2.0);

        let missing = write_tmp("missing.json", r#"{"eta_r0_mean": -2.0, "alpha_r": null}"#);
        let err = load_posterior(&missing).unwrap_err();
        let core = err.downcast_ref::<Error>().unwrap();
        assert_eq!(core.kind().as_str(), "missing_or_incomplete_posterior");
    }

    #[test]
    fn risk_profile_shapes() {
        let p = write_tmp(
            "stored.json",
            r#"[{"risk_id": "drought", "parameters": {"multipliers": [0.8]}}]"#,
        );
        let profiles = load_risk_profiles(&p).unwrap();
        assert!(profiles.resolve("drought").unwrap().is_some());
    }
}
