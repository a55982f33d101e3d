//! # Bankers Telemetry
//!
//! Crate for logging and transaction metrics.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
