//! erwstat CLI

mod inputs;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use erw_core::{FitReport, LabObservation, Posterior, SummaryStatistics};
use erw_inference::{
    RiskMultiplierSource, SimulationConfig, SimulationEnsemble, StateEstimator, TargetPolicy,
    filter_trace, simulate, summarize,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "erwstat")]
#[command(about = "erwstat - weathering kinetics estimation and CO2 removal projection")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the latent model to lab (and optional field) records
    Fit {
        /// Lab records (JSON array of {time_months, uptake})
        #[arg(long)]
        lab: PathBuf,

        /// Field records (JSON array of {window_start, window_end, removed})
        #[arg(long)]
        field: Option<PathBuf>,

        /// Optimizer iteration budget
        #[arg(long, default_value = "1000")]
        max_iter: u64,

        /// Optimizer wall-clock budget in seconds
        #[arg(long)]
        time_budget_secs: Option<f64>,

        /// Include the per-observation filter trace
        #[arg(long)]
        trace: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Monte Carlo projection of total removal from a posterior
    Simulate {
        /// Posterior (fit output, or a stored posterior record)
        #[arg(long)]
        posterior: PathBuf,

        /// Application rate A
        #[arg(long)]
        application_rate: Option<f64>,

        /// Chemistry factor K
        #[arg(long)]
        chemistry_factor: Option<f64>,

        /// Number of runs
        #[arg(long, default_value = "1000")]
        n_runs: usize,

        /// Horizon in months
        #[arg(long, default_value = "120")]
        horizon: usize,

        /// Base seed (random when omitted; reported in the output)
        #[arg(long)]
        seed: Option<u64>,

        /// Risk profiles file
        #[arg(long, requires = "risk_profile")]
        risk_profiles: Option<PathBuf>,

        /// Risk profile id within `--risk-profiles`
        #[arg(long, requires = "risk_profiles")]
        risk_profile: Option<String>,

        /// Explicit hit target (default: 0.3 x application rate)
        #[arg(long)]
        target: Option<f64>,

        /// Threads (0 = auto, 1 = sequential). Results do not depend on it.
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Keep per-month removals of every run
        #[arg(long)]
        keep_trajectories: bool,

        /// Wall-clock budget in seconds
        #[arg(long)]
        time_budget_secs: Option<f64>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize an ensemble of totals
    Summarize {
        /// Totals (JSON array, stored run rows, or simulate output)
        #[arg(short, long)]
        input: PathBuf,

        /// Explicit hit target
        #[arg(long)]
        target: Option<f64>,

        /// Application rate for the default target rule
        #[arg(long)]
        application_rate: Option<f64>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit, simulate and summarize from a YAML/JSON run config
    Run {
        /// Run config (.yaml / .yml / .json)
        #[arg(long)]
        config: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {err:#}", error_kind(&err));
            ExitCode::FAILURE
        }
    }
}

/// Stable kind of the first core error in the chain.
fn error_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|e| e.downcast_ref::<erw_core::Error>())
        .map_or("cli", |e| e.kind().as_str())
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Fit { lab, field, max_iter, time_budget_secs, trace, output } => {
            cmd_fit(&lab, field.as_ref(), max_iter, time_budget_secs, trace, output.as_ref())
        }
        Commands::Simulate {
            posterior,
            application_rate,
            chemistry_factor,
            n_runs,
            horizon,
            seed,
            risk_profiles,
            risk_profile,
            target,
            threads,
            keep_trajectories,
            time_budget_secs,
            output,
        } => {
            let config = SimulationConfig {
                n_runs,
                horizon_months: horizon,
                seed,
                n_threads: threads,
                record_trajectories: keep_trajectories,
                time_budget: run::budget(time_budget_secs)?,
            };
            let risk = match (risk_profiles, risk_profile) {
                (Some(path), Some(id)) => inputs::load_risk_profiles(&path)?.resolve(&id)?,
                _ => None,
            };
            let posterior = inputs::load_posterior(&posterior)?;
            let (ensemble, summary) = project(
                &posterior,
                application_rate,
                chemistry_factor,
                risk.as_ref(),
                &config,
                target,
            )?;
            write_json(output.as_ref(), simulation_json(&ensemble, &summary))
        }
        Commands::Summarize { input, target, application_rate, output } => {
            let totals = inputs::load_totals(&input)?;
            let policy =
                TargetPolicy { explicit: target, application_rate, ..TargetPolicy::default() };
            let summary = summarize(&totals, &policy)?;
            write_json(output.as_ref(), serde_json::to_value(summary)?)
        }
        Commands::Run { config } => cmd_run(&config),
        Commands::Version => {
            println!("erwstat {}", erw_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_fit(
    lab: &PathBuf,
    field: Option<&PathBuf>,
    max_iter: u64,
    time_budget_secs: Option<f64>,
    trace: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let config = run::OptimizerSection { max_iter, time_budget_secs }.to_config()?;
    let lab = inputs::load_lab(lab)?;
    let field = field.map(|p| inputs::load_field(p)).transpose()?;

    let report = StateEstimator::new(config).fit(&lab, field.as_deref())?;
    tracing::info!(nll = report.nll, n_iter = report.n_iter, "fit converged");
    write_json(output, fit_json(&report, &lab, trace)?)
}

fn fit_json(report: &FitReport, lab: &[LabObservation], trace: bool) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(report)?;
    if trace {
        let trace = filter_trace(&report.parameters, &report.prior, lab);
        value["trace"] = serde_json::to_value(trace)?;
    }
    Ok(value)
}

fn project(
    posterior: &Posterior,
    application_rate: Option<f64>,
    chemistry_factor: Option<f64>,
    risk: Option<&RiskMultiplierSource>,
    config: &SimulationConfig,
    target: Option<f64>,
) -> Result<(SimulationEnsemble, SummaryStatistics)> {
    let ensemble = simulate(posterior, application_rate, chemistry_factor, risk, config)?;
    tracing::info!(runs = ensemble.len(), seed = ensemble.seed, "simulation finished");
    let policy = TargetPolicy { explicit: target, application_rate, ..TargetPolicy::default() };
    let summary = summarize(&ensemble.totals(), &policy)?;
    Ok((ensemble, summary))
}

fn simulation_json(
    ensemble: &SimulationEnsemble,
    summary: &SummaryStatistics,
) -> serde_json::Value {
    json!({
        "seed": ensemble.seed,
        "n_runs": ensemble.len(),
        "horizon_months": ensemble.horizon_months,
        "n_totals": ensemble.totals(),
        "runs": ensemble.runs,
        "summary": summary,
    })
}

fn cmd_run(config_path: &PathBuf) -> Result<()> {
    let cfg = run::read_run_config(config_path)?;
    tracing::info!(config = %config_path.display(), "starting run");

    let lab = inputs::load_lab(&cfg.lab)?;
    let field = cfg.field.as_deref().map(inputs::load_field).transpose()?;
    let report = StateEstimator::new(cfg.optimizer.to_config()?).fit(&lab, field.as_deref())?;

    let risk = match (&cfg.risk_profiles, &cfg.risk_profile) {
        (Some(path), Some(id)) => inputs::load_risk_profiles(path)?.resolve(id)?,
        (None, Some(id)) => return Err(erw_core::Error::UnknownRiskProfile(id.clone()).into()),
        _ => None,
    };
    let sim_config = cfg.simulation.to_config()?;
    let (ensemble, summary) = project(
        &report.posterior,
        cfg.application_rate,
        cfg.chemistry_factor,
        risk.as_ref(),
        &sim_config,
        cfg.target,
    )?;

    let value = json!({
        "fit": fit_json(&report, &lab, false)?,
        "simulation": simulation_json(&ensemble, &summary),
    });
    write_json(cfg.output.as_ref(), value)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
