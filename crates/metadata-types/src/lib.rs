//! Shared types for the metadata-batch workspace.
//!
//! This crate provides foundational types used across the transport, checkpoint and
//! engine crates, breaking circular dependency chains.
//!
//! ## Record Types
//!
//! The [`record`] module contains the values that flow through an update run:
//! - [`TargetRecord`](record::TargetRecord) - desired field values from the manifest
//! - [`OnChainRecord`](record::OnChainRecord) - decoded snapshot of the remote account
//! - [`UpdateOutcome`](record::UpdateOutcome) - one logged result per processed record
//! - [`Tallies`](record::Tallies) - running counts persisted with checkpoints

pub mod address;
pub mod record;

// Re-export commonly used types at crate root
pub use address::{Address, AddressParseError};
pub use record::{
    OnChainRecord, OutcomeKind, RecordFields, Tallies, TargetRecord, UpdateOutcome,
};

use std::time::Duration;

/// Configuration for retry behavior on network operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every following retry.
    pub base_delay: Duration,
}

impl RetryConfig {
    /// Create a new RetryConfig with the specified parameters.
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay slept after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let config = RetryConfig::new(4, 250);
        assert_eq!(config.delay_for(0), Duration::from_millis(250));
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_saturates() {
        let config = RetryConfig::new(64, 1000);
        assert!(config.delay_for(40) >= config.delay_for(31));
    }
}
