//! Record values exchanged between the manifest, the ledger and the run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Address;

/// Desired end state for one ledger record, as loaded from a manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Address of the record account.
    pub id: Address,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

impl TargetRecord {
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            uri: self.uri.clone(),
        }
    }
}

/// Decoded snapshot of a record account as currently stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainRecord {
    /// Identity allowed to mutate the record.
    pub authority: Address,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

impl OnChainRecord {
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            uri: self.uri.clone(),
        }
    }
}

/// The mutable text fields of a record (used for old/new pairs in the log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub id: Address,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

/// Terminal state reached for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The record differed from the target and was (or, in a dry run, would be) rewritten.
    Updated {
        old: RecordFields,
        new: RecordFields,
        /// Confirmation id of the submitted transaction; absent for simulated updates.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        simulated: bool,
    },
    /// Nothing to do.
    Skipped { reason: String },
    /// The record could not be updated.
    Failed { reason: String },
}

impl UpdateOutcome {
    /// Stamp an outcome with the current time.
    pub fn new(id: Address, kind: OutcomeKind) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn failed(id: Address, reason: impl Into<String>) -> Self {
        Self::new(
            id,
            OutcomeKind::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn skipped(id: Address, reason: impl Into<String>) -> Self {
        Self::new(
            id,
            OutcomeKind::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn is_updated(&self) -> bool {
        matches!(self.kind, OutcomeKind::Updated { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.kind, OutcomeKind::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed { .. })
    }

    /// Short label used in logs ("updated", "simulated", "skipped", "failed").
    pub fn label(&self) -> &'static str {
        match &self.kind {
            OutcomeKind::Updated {
                simulated: true, ..
            } => "simulated",
            OutcomeKind::Updated { .. } => "updated",
            OutcomeKind::Skipped { .. } => "skipped",
            OutcomeKind::Failed { .. } => "failed",
        }
    }
}

/// Running counts of processed records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tallies {
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl Tallies {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &UpdateOutcome) {
        self.processed += 1;
        match outcome.kind {
            OutcomeKind::Updated { .. } => self.updated += 1,
            OutcomeKind::Skipped { .. } => self.skipped += 1,
            OutcomeKind::Failed { .. } => self.failed += 1,
        }
    }
}
