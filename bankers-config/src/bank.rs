//! Bank configuration.
//!
//! The fixed supply of each resource type and the number of consumers
//! contending for it. Both are set once per run.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Resource supply and consumer population.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BankConfig {
    /// Units of each resource type (one entry per type).
    #[validate(length(min = 1, max = 64, message = "between 1 and 64 resource types"))]
    #[validate(custom(function = validation::validate_supply))]
    #[serde(default = "default_available")]
    pub available: Vec<u32>,

    /// Number of concurrent consumers.
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_consumers")]
    pub consumers: usize,
}

fn default_available() -> Vec<u32> {
    vec![10, 5, 7]
}

fn default_consumers() -> usize {
    5
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            available: default_available(),
            consumers: default_consumers(),
        }
    }
}
