// bankers-simulator/src/lib.rs

/*!
# Bankers Simulator

Drives a population of consumers against a shared [`Bank`] until every
consumer has obtained and returned its whole claim.

## Key Components:
- **Consumer:** request/release state machine with its own seeded RNG.
- **Workers:** one OS thread per consumer, contending on the bank's lock.
- **Lockstep:** single-threaded seeded interleaving with a BLAKE3 transcript.
- **Observers:** hooks that see the ledger after every release.
*/

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, instrument, warn};

use bankers_config::{BankersConfig, RetryConfig, RetryStrategy, SimulationMode};
use bankers_core::{Bank, Ledger, Snapshot, WaitStrategy};
use bankers_telemetry::MetricsRecorder;

pub mod consumer;
pub mod error;
pub mod lockstep;
pub mod worker;

pub use consumer::{Consumer, ConsumerReport, ConsumerState};
pub use error::SimulationError;
pub use worker::{spawn, WorkerOptions};

/// Sees the ledger right after each release.
pub trait StateObserver: Send + Sync {
    fn on_release(&self, consumer: usize, released: &[u32], snapshot: &Snapshot);
}

/// Maps the configured retry policy onto the bank's wait strategy.
pub fn wait_strategy(retry: &RetryConfig) -> WaitStrategy {
    match retry.strategy {
        RetryStrategy::Notify => WaitStrategy::Notify,
        RetryStrategy::Spin => WaitStrategy::Spin,
        RetryStrategy::Backoff => WaitStrategy::Backoff {
            initial: Duration::from_micros(retry.backoff_initial_us),
            max: Duration::from_micros(retry.backoff_max_us),
        },
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: SimulationMode,
    pub seed: u64,
    pub consumers: Vec<ConsumerReport>,
    pub final_state: Snapshot,
    /// Lockstep runs only.
    pub steps: Option<u64>,
    /// Lockstep runs only: hex BLAKE3 hash of every transaction in order.
    pub transcript: Option<String>,
}

impl RunReport {
    pub fn grants(&self) -> u64 {
        self.consumers.iter().map(|c| c.grants).sum()
    }

    pub fn denials(&self) -> u64 {
        self.consumers.iter().map(ConsumerReport::denials).sum()
    }

    pub fn releases(&self) -> u64 {
        self.consumers.iter().map(|c| c.releases).sum()
    }
}

/// A ready-to-run simulation: initial ledger, seed and worker options.
pub struct Simulation {
    ledger: Ledger,
    seed: u64,
    max_steps: u64,
    options: WorkerOptions,
}

impl Simulation {
    /// Builds the ledger from `config`, drawing a seed if none is configured.
    pub fn from_config(config: &BankersConfig) -> Result<Self, SimulationError> {
        let seed = config.simulation.seed.unwrap_or_else(|| {
            let seed = rand::rng().random();
            info!(seed, "No seed configured, drew one");
            seed
        });
        let mut rng = SmallRng::seed_from_u64(seed);
        let ledger = Ledger::initialize(&config.bank.available, config.bank.consumers, &mut rng)?;

        Ok(Self::with_ledger(ledger, seed)
            .with_strategy(wait_strategy(&config.simulation.retry))
            .with_max_steps(config.simulation.max_steps))
    }

    /// Wraps an existing ledger; `seed` drives the consumers and scheduler.
    pub fn with_ledger(ledger: Ledger, seed: u64) -> Self {
        Self {
            ledger,
            seed,
            max_steps: 1_000_000,
            options: WorkerOptions::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.options.observer = Some(observer);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.options.metrics = Some(metrics);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn initial_state(&self) -> Snapshot {
        self.ledger.snapshot()
    }

    pub fn run(self, mode: SimulationMode) -> Result<RunReport, SimulationError> {
        match mode {
            SimulationMode::Threaded => self.run_threaded(),
            SimulationMode::Lockstep => self.run_lockstep(),
        }
    }

    /// One thread per consumer; returns once all of them are done.
    #[instrument(skip(self), fields(seed = self.seed))]
    pub fn run_threaded(self) -> Result<RunReport, SimulationError> {
        let consumers = self.ledger.consumers();
        info!(consumers, strategy = ?self.options.strategy, "Starting threaded run");

        let bank = Arc::new(Bank::new(self.ledger));
        let mut handles = Vec::with_capacity(consumers);
        for id in 0..consumers {
            let consumer = Consumer::new(id, self.seed);
            match spawn(bank.clone(), consumer, self.options.clone()) {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => {
                    bank.abort();
                    let _ = join_all(handles);
                    return Err(e);
                }
            }
        }

        let reports = join_all(handles)?;
        let final_state = bank.snapshot();
        let report = RunReport {
            mode: SimulationMode::Threaded,
            seed: self.seed,
            consumers: reports,
            final_state,
            steps: None,
            transcript: None,
        };
        verify(&report)?;
        Ok(report)
    }

    /// Seeded single-threaded interleaving; reproducible for a given seed.
    #[instrument(skip(self), fields(seed = self.seed))]
    pub fn run_lockstep(self) -> Result<RunReport, SimulationError> {
        info!(consumers = self.ledger.consumers(), "Starting lockstep run");
        let outcome = lockstep::run(self.ledger, self.seed, self.max_steps, &self.options)?;
        let report = RunReport {
            mode: SimulationMode::Lockstep,
            seed: self.seed,
            consumers: outcome.reports,
            final_state: outcome.ledger.snapshot(),
            steps: Some(outcome.steps),
            transcript: Some(outcome.transcript),
        };
        verify(&report)?;
        Ok(report)
    }
}

type WorkerHandle = std::thread::JoinHandle<Result<ConsumerReport, SimulationError>>;

/// Joins every worker. The first primary failure wins over the `Aborted`
/// errors it caused in the other workers.
fn join_all(handles: Vec<(usize, WorkerHandle)>) -> Result<Vec<ConsumerReport>, SimulationError> {
    let mut reports = Vec::with_capacity(handles.len());
    let mut primary: Option<SimulationError> = None;
    let mut secondary: Option<SimulationError> = None;

    for (id, handle) in handles {
        let result = handle
            .join()
            .unwrap_or(Err(SimulationError::WorkerPanicked(id)));
        match result {
            Ok(report) => reports.push(report),
            Err(e) if e.is_secondary() => {
                secondary.get_or_insert(e);
            }
            Err(e) => {
                warn!(consumer = id, "Worker failed: {e}");
                primary.get_or_insert(e);
            }
        }
    }

    match primary.or(secondary) {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

fn verify(report: &RunReport) -> Result<(), SimulationError> {
    report.final_state.check_invariants()?;
    if let Some(i) = (0..report.final_state.consumers()).find(|&i| !report.final_state.is_settled(i)) {
        return Err(SimulationError::Unsettled(i));
    }
    Ok(())
}
