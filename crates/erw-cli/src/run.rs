//! `erwstat run`: fit, simulate and summarize from one config file.

use anyhow::{Context, Result};
use erw_inference::{OptimizerConfig, SimulationConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Lab records (JSON array).
    pub lab: PathBuf,
    /// Optional field records (JSON array).
    #[serde(default)]
    pub field: Option<PathBuf>,

    /// Configuration pair. Missing values surface as `missing_configuration_parameter`.
    #[serde(default)]
    pub application_rate: Option<f64>,
    #[serde(default)]
    pub chemistry_factor: Option<f64>,

    #[serde(default)]
    pub risk_profiles: Option<PathBuf>,
    #[serde(default)]
    pub risk_profile: Option<String>,

    /// Explicit hit target; defaults to the application-rate rule.
    #[serde(default)]
    pub target: Option<f64>,

    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Output file; stdout when absent.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerSection {
    pub max_iter: u64,
    pub time_budget_secs: Option<f64>,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self { max_iter: OptimizerConfig::default().max_iter, time_budget_secs: None }
    }
}

impl OptimizerSection {
    pub fn to_config(&self) -> Result<OptimizerConfig> {
        Ok(OptimizerConfig {
            max_iter: self.max_iter,
            time_budget: budget(self.time_budget_secs)?,
            ..OptimizerConfig::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    #[serde(flatten)]
    pub config: SimulationConfig,
    pub time_budget_secs: Option<f64>,
}

impl SimulationSection {
    pub fn to_config(&self) -> Result<SimulationConfig> {
        Ok(SimulationConfig { time_budget: budget(self.time_budget_secs)?, ..self.config.clone() })
    }
}

/// Seconds to a wall-clock budget.
pub fn budget(secs: Option<f64>) -> Result<Option<Duration>> {
    secs.map(|s| {
        Duration::try_from_secs_f64(s).map_err(|e| {
            erw_core::Error::Validation(format!("invalid time budget {s}: {e}")).into()
        })
    })
    .transpose()
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path)
        .map_err(erw_core::Error::Io)
        .with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: RunConfig = if ext == "json" {
        serde_json::from_slice(&bytes).map_err(erw_core::Error::Json)?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)
            .map_err(|e| erw_core::Error::Validation(format!("invalid run config: {e}")))?
    };

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    cfg.lab = resolve(base, &cfg.lab);
    cfg.field = cfg.field.map(|p| resolve(base, &p));
    cfg.risk_profiles = cfg.risk_profiles.map(|p| resolve(base, &p));
    cfg.output = cfg.output.map(|p| resolve(base, &p));
    Ok(cfg)
}

/// Relative paths in a config are relative to the config file.
fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}
