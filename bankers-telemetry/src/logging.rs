//! ## bankers-telemetry::logging
//! **Structured logging with tracing**
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! configured level so a single run can be turned up without editing config.

use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber writing to stderr, leaving stdout to
    /// the caller. Fails if one is already installed.
    pub fn init(level: &str, json: bool) -> Result<(), InitError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE);

        if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    }

    /// Logs the outcome of a whole run inside a `run_summary` span.
    pub fn log_run_summary(mode: &str, seed: u64, grants: u64, denials: u64, releases: u64) {
        let span = info_span!("run_summary", mode = mode, seed = seed);
        let _entered = span.enter();
        tracing::info!(grants, denials, releases, "Simulation finished");
    }
}
