//! Per-record update protocol.
//!
//! ```text
//! fetch ─┬─ absent ─────────────────────────────────► Failed (not found)
//!        └─ bytes ─► decode ─► authorize ─┬─ mismatch ─► Failed
//!                                         └─ ok ─► diff ─┬─ equal ─► Skipped
//!                                                        └─ changed ─► validate lengths
//!                                                              ├─ dry run ─► Updated (simulated)
//!                                                              └─ build ─► submit ─► Updated
//! ```
//!
//! Fetch and submit are retried independently. Nothing else is retried: a missing
//! account, a malformed account or a foreign authority will not change between attempts.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use metadata_batch_types::{
    Address, OnChainRecord, OutcomeKind, RecordFields, RetryConfig, TargetRecord, UpdateOutcome,
};
use metadata_transport::{RemoteClient, Signer};
use tracing::debug;

use crate::authority::{authorize, AuthorityError};
use crate::codec::{self, CodecError};
use crate::diff::changed_fields;
use crate::retry::RetryExecutor;

/// Why a record ended in a `Failed` outcome. The `Display` text is the logged reason.
#[derive(Debug)]
pub enum UpdateError {
    NotFound { id: Address },
    Fetch(anyhow::Error),
    Malformed(CodecError),
    Unauthorized(AuthorityError),
    InvalidTarget(CodecError),
    Submit(anyhow::Error),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::NotFound { id } => write!(f, "record not found: {}", id),
            UpdateError::Fetch(e) => write!(f, "fetch failed: {:#}", e),
            UpdateError::Malformed(e) => write!(f, "{}", e),
            UpdateError::Unauthorized(e) => write!(f, "{}", e),
            UpdateError::InvalidTarget(e) => write!(f, "invalid target: {}", e),
            UpdateError::Submit(e) => write!(f, "submission failed: {:#}", e),
        }
    }
}

impl std::error::Error for UpdateError {}

pub struct UpdateEngine {
    client: Arc<dyn RemoteClient>,
    signer: Arc<dyn Signer>,
    retry: RetryExecutor,
}

impl UpdateEngine {
    pub fn new(client: Arc<dyn RemoteClient>, signer: Arc<dyn Signer>, retry: RetryConfig) -> Self {
        Self {
            client,
            signer,
            retry: RetryExecutor::new(retry),
        }
    }

    /// Identity of the configured signer.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Bring one record to its target state. Never fails: every error becomes a
    /// `Failed` outcome.
    ///
    /// At most one submission is made, and only when `dry_run` is false, `caller` holds
    /// the record's authority, and at least one field differs.
    pub async fn update(&self, target: &TargetRecord, caller: &Address, dry_run: bool) -> UpdateOutcome {
        match self.try_update(target, caller, dry_run).await {
            Ok(kind) => UpdateOutcome::new(target.id, kind),
            Err(e) => UpdateOutcome::failed(target.id, e.to_string()),
        }
    }

    async fn try_update(
        &self,
        target: &TargetRecord,
        caller: &Address,
        dry_run: bool,
    ) -> Result<OutcomeKind, UpdateError> {
        let current = self.fetch(&target.id).await?;
        authorize(&current, caller).map_err(UpdateError::Unauthorized)?;

        let changed = changed_fields(&current, target);
        if changed.is_empty() {
            return Ok(OutcomeKind::Skipped {
                reason: "no changes".to_string(),
            });
        }
        debug!(id = %target.id, fields = ?changed, "record differs from target");

        let new = RecordFields {
            name: target.name.trim().to_string(),
            symbol: target.symbol.trim().to_string(),
            uri: target.uri.trim().to_string(),
        };
        codec::validate_lengths(&new.name, &new.symbol, &new.uri)
            .map_err(UpdateError::InvalidTarget)?;

        if dry_run {
            return Ok(OutcomeKind::Updated {
                old: current.fields(),
                new,
                signature: None,
                simulated: true,
            });
        }

        let instruction =
            codec::build_update_instruction(&target.id, caller, &new.name, &new.symbol, &new.uri);
        let signature = self
            .retry
            .run("submit", || self.client.submit(&instruction, self.signer.as_ref()))
            .await
            .map_err(UpdateError::Submit)?;
        debug!(id = %target.id, %signature, "update confirmed");

        Ok(OutcomeKind::Updated {
            old: current.fields(),
            new,
            signature: Some(signature),
            simulated: false,
        })
    }

    async fn fetch(&self, id: &Address) -> Result<OnChainRecord, UpdateError> {
        let raw = self
            .retry
            .run("fetch", || self.client.fetch_raw(id))
            .await
            .map_err(UpdateError::Fetch)?
            .ok_or(UpdateError::NotFound { id: *id })?;
        codec::decode(&raw).map_err(UpdateError::Malformed)
    }
}
