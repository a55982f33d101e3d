//! # Bankers Configuration System
//!
//! Layered configuration for the banker simulation.
//!
//! ## Features
//! - **Unified Configuration**: one tree for bank, simulation and telemetry
//! - **Validation**: every field range-checked before a run starts
//! - **Environment Awareness**: `BANKERS_*` variables override files

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod bank;
mod error;
mod simulation;
mod telemetry;
mod validation;

pub use bank::BankConfig;
pub use error::ConfigError;
pub use simulation::{RetryConfig, RetryStrategy, SimulationConfig, SimulationMode};
pub use telemetry::TelemetryConfig;

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct BankersConfig {
    /// Resource supply and consumer count.
    #[validate(nested)]
    #[serde(default)]
    pub bank: BankConfig,

    /// Seeding, scheduling and retry behaviour.
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging parameters.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BankersConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/bankers.yaml` - Base settings, skipped if missing.
    /// 3. `config/<BANKERS_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `BANKERS_*` environment variables (`__` separates nested keys).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(BankersConfig::default()));

        if Path::new("config/bankers.yaml").exists() {
            figment = figment.merge(Yaml::file("config/bankers.yaml"));
        }

        if let Ok(env) = std::env::var("BANKERS_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment.merge(Env::prefixed("BANKERS_").split("__")))
    }

    /// Load configuration from a specific path, still honouring `BANKERS_*`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(BankersConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("BANKERS_").split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field rules `validator` cannot express.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let retry = &self.simulation.retry;
        if retry.backoff_initial_us > retry.backoff_max_us {
            return Err(ConfigError::Inconsistent(format!(
                "simulation.retry.backoff_initial_us ({}) exceeds backoff_max_us ({})",
                retry.backoff_initial_us, retry.backoff_max_us
            )));
        }
        Ok(())
    }
}
