use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use bankers_config::{BankersConfig, RetryStrategy, SimulationMode};
use bankers_simulator::{RunReport, Simulation};
use bankers_telemetry::{EventLogger, MetricsRecorder};

use crate::table::{render_state, render_summary, TablePrinter};

#[derive(Parser)]
#[command(name = "bankers", version, about = "Banker's algorithm deadlock-avoidance simulation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run consumers against the bank until every one has returned its claim
    Run(RunArgs),
    /// Validate a configuration and print it
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Units of each resource type; replaces `bank.available`
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub available: Vec<u32>,
    /// Number of consumers
    #[arg(short, long)]
    pub consumers: Option<usize>,
    /// Seed for the maximum matrix and every consumer's choices
    #[arg(short, long)]
    pub seed: Option<u64>,
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,
    /// What a consumer does after a denied request
    #[arg(short, long, value_enum)]
    pub retry: Option<RetryArg>,
    /// Configuration file; defaults to `config/bankers.yaml` layering
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Print the state table after every release
    #[arg(long)]
    pub trace_state: bool,
    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Threaded,
    Lockstep,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryArg {
    Notify,
    Backoff,
    Spin,
}

impl From<ModeArg> for SimulationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Threaded => SimulationMode::Threaded,
            ModeArg::Lockstep => SimulationMode::Lockstep,
        }
    }
}

impl From<RetryArg> for RetryStrategy {
    fn from(retry: RetryArg) -> Self {
        match retry {
            RetryArg::Notify => RetryStrategy::Notify,
            RetryArg::Backoff => RetryStrategy::Backoff,
            RetryArg::Spin => RetryStrategy::Spin,
        }
    }
}

impl RunArgs {
    /// Command-line values win over every configuration layer.
    pub fn apply(&self, config: &mut BankersConfig) {
        if !self.available.is_empty() {
            config.bank.available = self.available.clone();
        }
        if let Some(consumers) = self.consumers {
            config.bank.consumers = consumers;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
        }
        if let Some(mode) = self.mode {
            config.simulation.mode = mode.into();
        }
        if let Some(retry) = self.retry {
            config.simulation.retry.strategy = retry.into();
        }
    }
}

pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(args.config.as_deref())?;
            args.apply(&mut config);
            config.check().context("invalid configuration")?;
            EventLogger::init(&config.telemetry.log_level, config.telemetry.json)
                .map_err(|e| anyhow!(e))?;

            let printer = Arc::new(TablePrinter::new(std::io::stdout(), args.trace_state));
            simulate(&config, &args, printer)?;
            Ok(())
        }
        Commands::Check(args) => {
            let config = load_config(args.config.as_deref())?;
            let yaml = serde_yaml::to_string(&config)?;
            println!("{yaml}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BankersConfig> {
    let config = match path {
        Some(path) => BankersConfig::load_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BankersConfig::load().context("failed to load configuration")?,
    };
    Ok(config)
}

/// Runs one simulation, writing every table through `printer`.
pub fn simulate<W: Write + Send + 'static>(
    config: &BankersConfig,
    args: &RunArgs,
    printer: Arc<TablePrinter<W>>,
) -> Result<RunReport> {
    let metrics = if args.metrics {
        Some(MetricsRecorder::new()?)
    } else {
        None
    };

    let mut simulation = Simulation::from_config(config)?.with_observer(printer.clone());
    if let Some(metrics) = &metrics {
        simulation = simulation.with_metrics(metrics.clone());
    }
    info!(
        seed = simulation.seed(),
        available = ?config.bank.available,
        consumers = config.bank.consumers,
        "Bank initialised"
    );
    printer.emit(&render_state(&simulation.initial_state()))?;

    let report = simulation.run(config.simulation.mode)?;

    printer.emit(&format!("\nfinal state\n{}", render_state(&report.final_state)))?;
    printer.emit(&format!("\n{}", render_summary(&report)))?;
    if let Some(metrics) = &metrics {
        printer.emit(&format!("\n{}", metrics.gather_metrics()?))?;
    }

    let mode = match report.mode {
        SimulationMode::Threaded => "threaded",
        SimulationMode::Lockstep => "lockstep",
    };
    EventLogger::log_run_summary(
        mode,
        report.seed,
        report.grants(),
        report.denials(),
        report.releases(),
    );
    Ok(report)
}
