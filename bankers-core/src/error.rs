use thiserror::Error;

/// Faults raised by the ledger. Denials are not errors; see [`crate::Decision`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown consumer P{consumer} (ledger has {consumers} consumers)")]
    UnknownConsumer { consumer: usize, consumers: usize },

    #[error("Vector has {actual} entries, ledger tracks {expected} resource types")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("P{consumer} requested {requested} of R{resource} but only needs {need}")]
    ExceedsNeed {
        consumer: usize,
        resource: usize,
        requested: u32,
        need: u32,
    },

    #[error("P{consumer} released {released} of R{resource} but only holds {held}")]
    ExceedsAllocation {
        consumer: usize,
        resource: usize,
        released: u32,
        held: u32,
    },

    #[error("Bank was aborted while P{consumer} was waiting")]
    Aborted { consumer: usize },
}

/// A broken ledger invariant, reported by [`crate::Snapshot::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("P{consumer}/R{resource}: allocation {allocation} + need {need} + retired {retired} != maximum {maximum}")]
    ClaimMismatch {
        consumer: usize,
        resource: usize,
        allocation: u32,
        need: u32,
        retired: u32,
        maximum: u32,
    },

    #[error("R{resource}: available {available} + allocated {allocated} != total {total}")]
    Conservation {
        resource: usize,
        available: u32,
        allocated: u64,
        total: u32,
    },

    #[error("P{consumer}/R{resource}: maximum {maximum} exceeds total {total}")]
    MaximumAboveTotal {
        consumer: usize,
        resource: usize,
        maximum: u32,
        total: u32,
    },

    #[error("Matrix shapes disagree with {consumers}x{resources}")]
    Shape { consumers: usize, resources: usize },
}
