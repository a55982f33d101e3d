//! Simulation configuration.
//!
//! Seeding, scheduling mode and the retry policy consumers apply after a
//! denied request.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// How consumers are scheduled.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// One OS thread per consumer.
    #[default]
    Threaded,
    /// Single thread, seeded interleaving; reproducible transcript.
    Lockstep,
}

/// What a consumer does after a denial.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Block until another consumer releases units.
    #[default]
    Notify,
    /// Exponential sleep between attempts.
    Backoff,
    /// Yield and retry immediately.
    Spin,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// First backoff delay (microseconds).
    #[validate(range(min = 1, max = 10_000_000))]
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_us: u64,

    /// Backoff ceiling (microseconds).
    #[validate(range(min = 1, max = 10_000_000))]
    #[serde(default = "default_backoff_max")]
    pub backoff_max_us: u64,
}

fn default_backoff_initial() -> u64 {
    50
}

fn default_backoff_max() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            backoff_initial_us: default_backoff_initial(),
            backoff_max_us: default_backoff_max(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SimulationConfig {
    /// Seed for maximum claims and every consumer's choices. Drawn from the
    /// OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub mode: SimulationMode,

    /// Upper bound on lockstep scheduler steps.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_steps() -> u64 {
    1_000_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            mode: SimulationMode::default(),
            max_steps: default_max_steps(),
            retry: RetryConfig::default(),
        }
    }
}
