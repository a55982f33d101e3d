// bankers-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use validator::ValidationError;

/// Validate that every resource type has a positive supply.
pub fn validate_supply(values: &[u32]) -> Result<(), ValidationError> {
    if values.iter().any(|&v| v == 0) {
        let mut error = ValidationError::new("non_positive_supply");
        error.message = Some("every resource amount must be a positive integer".into());
        return Err(error);
    }
    Ok(())
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
