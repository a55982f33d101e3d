use bankers_core::{InvariantViolation, LedgerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Consumer P{0} panicked")]
    WorkerPanicked(usize),

    #[error("Lockstep run did not finish within {0} steps")]
    StepLimit(u64),

    #[error("Final state is inconsistent: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Consumer P{0} finished with resources still held or needed")]
    Unsettled(usize),
}

impl SimulationError {
    /// True for errors that only report a peer's failure.
    pub fn is_secondary(&self) -> bool {
        matches!(self, SimulationError::Ledger(LedgerError::Aborted { .. }))
    }
}
