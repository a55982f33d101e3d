//! # bankers-core
//!
//! Deadlock-avoiding resource accounting with the Banker's Algorithm.
//!
//! ### Key Submodules:
//! - `ledger`: available / maximum / allocation / need bookkeeping and the
//!   request / release transactions
//! - `safety`: the safety check gating every request
//! - `bank`: the ledger behind one mutex, with blocking requests
//! - `matrix`: runtime-sized consumer × resource matrices

pub mod bank;
pub mod error;
pub mod ledger;
pub mod matrix;
pub mod safety;

pub use bank::{Bank, Grant, WaitStrategy};
pub use error::{InvariantViolation, LedgerError};
pub use ledger::{Decision, DenialReason, Ledger, Snapshot};
pub use matrix::Matrix;
