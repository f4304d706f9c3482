//! Chunked, checkpointed batch runs.
//!
//! The orchestrator owns the outcome log and the checkpoint file for the length of a
//! run. Every checkpoint save rewrites `update_log.json` first and `checkpoint.json`
//! second, so each id in a saved checkpoint has a durable outcome entry. A crash between
//! the two writes leaves extra log entries that a resumed run drops again.
//!
//! Resuming re-queues every checkpointed record whose logged outcome is a failure, so
//! a kept checkpoint leads to a run over the unresolved records only. Checkpoints
//! remember whether a dry run wrote them, and resuming across modes is refused.
//!
//! A retry-failed run never touches the checkpoint. Its outcomes replace the matching
//! entries of the existing outcome log and the rest of the log is kept.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use metadata_batch_types::{Address, OutcomeKind, Tallies, TargetRecord, UpdateOutcome};
use metadata_checkpoint::paths::failed_ids_path;
use metadata_checkpoint::{Checkpoint, CheckpointStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::UpdateEngine;
use crate::report::{merge_outcomes, RunReporter, RunSummary};

/// Validated run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Records per chunk; must be non-zero.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
    /// Pause between records inside a chunk.
    pub record_delay: Duration,
    /// Save a checkpoint every this many processed records; must be non-zero.
    pub checkpoint_interval: usize,
    pub dry_run: bool,
    /// Continue from the checkpoint in the log directory, if there is one.
    pub resume: bool,
    /// The records are a retry of `failed_ids.json`; merge into the existing log.
    pub retry_failed: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            chunk_delay: Duration::from_millis(2000),
            record_delay: Duration::from_millis(100),
            checkpoint_interval: 10,
            dry_run: false,
            resume: false,
            retry_failed: false,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Outcomes of the records this run accounts for, including ones carried over
    /// from a resumed checkpoint.
    pub outcomes: Vec<UpdateOutcome>,
    pub failed_ids: Vec<Address>,
}

/// Mutable state of a run in progress.
#[derive(Default)]
struct Progress {
    tallies: Tallies,
    processed_ids: BTreeSet<Address>,
    outcomes: Vec<UpdateOutcome>,
    /// Log of an earlier run that a retry-failed run merges into.
    prior_log: Vec<UpdateOutcome>,
}

impl Progress {
    fn push(&mut self, outcome: UpdateOutcome) {
        self.tallies.record(&outcome);
        self.processed_ids.insert(outcome.id);
        self.outcomes.push(outcome);
    }

    fn failed_ids(&self) -> Vec<Address> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failed())
            .map(|o| o.id)
            .collect()
    }

    /// Contents of `update_log.json`.
    fn log(&self) -> Cow<'_, [UpdateOutcome]> {
        if self.prior_log.is_empty() {
            Cow::Borrowed(&self.outcomes)
        } else {
            Cow::Owned(merge_outcomes(&self.prior_log, &self.outcomes))
        }
    }
}

pub struct BatchOrchestrator {
    engine: UpdateEngine,
    store: CheckpointStore,
    reporter: RunReporter,
    caller: Address,
}

impl BatchOrchestrator {
    /// Orchestrator acting as the engine's signer.
    pub fn new(engine: UpdateEngine, store: CheckpointStore, reporter: RunReporter) -> Self {
        let caller = engine.signer_address();
        Self {
            engine,
            store,
            reporter,
            caller,
        }
    }

    /// Override the identity checked against each record's authority.
    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = caller;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    /// Process `records` in order.
    ///
    /// Per-record failures are recorded as outcomes. Only checkpoint and log I/O errors
    /// and unusable resume state are returned as `Err`. When `cancel` fires, the record
    /// in flight is finished, progress is flushed, and a summary with `cancelled = true`
    /// is returned.
    pub async fn run(
        &self,
        records: &[TargetRecord],
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        if config.resume && config.retry_failed {
            bail!("resume and retry-failed runs cannot be combined");
        }
        let started_at = Utc::now();
        let mut progress = if config.retry_failed {
            Progress {
                prior_log: self.reporter.load_outcomes()?,
                ..Progress::default()
            }
        } else {
            self.initial_progress(config)?
        };

        let remaining: Vec<&TargetRecord> = records
            .iter()
            .filter(|r| !progress.processed_ids.contains(&r.id))
            .collect();
        let chunk_size = config.chunk_size.max(1);
        let interval = config.checkpoint_interval.max(1) as u64;
        let chunk_count = remaining.len().div_ceil(chunk_size);
        info!(
            total = records.len(),
            remaining = remaining.len(),
            chunks = chunk_count,
            dry_run = config.dry_run,
            "starting run"
        );

        let mut cancelled = false;
        'chunks: for (chunk_index, chunk) in remaining.chunks(chunk_size).enumerate() {
            if chunk_index > 0 && !config.chunk_delay.is_zero() {
                debug!(delay_ms = config.chunk_delay.as_millis() as u64, "pausing between chunks");
                if pause(config.chunk_delay, cancel).await {
                    cancelled = true;
                    break;
                }
            }
            info!(chunk = chunk_index + 1, of = chunk_count, size = chunk.len(), "processing chunk");

            for (i, record) in chunk.iter().enumerate() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'chunks;
                }
                if i > 0 && !config.record_delay.is_zero() && pause(config.record_delay, cancel).await {
                    cancelled = true;
                    break 'chunks;
                }

                let outcome = self.engine.update(record, &self.caller, config.dry_run).await;
                log_outcome(&outcome, progress.tallies.processed + 1, records.len());
                progress.push(outcome);

                if progress.tallies.processed % interval == 0 {
                    self.flush(&progress, config)?;
                }
            }
        }

        let failed_ids = progress.failed_ids();
        let mut outstanding = failed_ids.clone();
        if config.retry_failed {
            // retried ids never reached stay listed
            outstanding.extend(
                records
                    .iter()
                    .map(|r| r.id)
                    .filter(|id| !progress.processed_ids.contains(id)),
            );
        }

        if cancelled {
            warn!(processed = progress.tallies.processed, "run cancelled, saving progress");
            self.flush(&progress, config)?;
        } else if outstanding.is_empty() {
            self.reporter.write_outcomes(&progress.log())?;
            if !config.retry_failed && self.store.delete()? {
                debug!("checkpoint removed after clean run");
            }
        } else {
            self.flush(&progress, config)?;
            warn!(
                failed = outstanding.len(),
                path = %failed_ids_path(self.reporter.log_dir()).display(),
                "some records failed"
            );
        }
        if outstanding.is_empty() {
            if self.reporter.clear_failed_ids()? {
                debug!("stale failed id list removed");
            }
        } else {
            self.reporter.write_failed_ids(&outstanding)?;
        }

        let summary = RunSummary::from_outcomes(
            records.len(),
            &progress.outcomes,
            config.dry_run,
            cancelled,
            started_at,
            Utc::now(),
        );
        self.reporter.write_summary(&summary)?;

        Ok(RunReport {
            summary,
            outcomes: progress.outcomes,
            failed_ids,
        })
    }

    fn initial_progress(&self, config: &RunConfig) -> Result<Progress> {
        if !config.resume {
            if self.store.exists() {
                warn!(
                    path = %self.store.path().display(),
                    "existing checkpoint ignored; it will be replaced by this run"
                );
            }
            return Ok(Progress::default());
        }

        let Some(checkpoint) = self.store.load()? else {
            info!("no checkpoint found, starting from the beginning");
            return Ok(Progress::default());
        };
        if checkpoint.dry_run != config.dry_run {
            bail!(
                "checkpoint {} was written by a {} run and cannot resume a {} run; \
                 use another --log-dir or start without --resume",
                self.store.path().display(),
                mode_name(checkpoint.dry_run),
                mode_name(config.dry_run)
            );
        }

        let mut outcomes = self.reporter.load_outcomes()?;
        let logged = outcomes.len();
        outcomes.retain(|o| checkpoint.processed_ids.contains(&o.id));
        if outcomes.len() != logged {
            debug!(dropped = logged - outcomes.len(), "dropped log entries newer than checkpoint");
        }
        if outcomes.len() as u64 != checkpoint.tallies.processed {
            warn!(
                logged = outcomes.len(),
                checkpointed = checkpoint.tallies.processed,
                "outcome log does not cover every checkpointed record"
            );
        }

        let mut tallies = checkpoint.tallies;
        let mut processed_ids = checkpoint.processed_ids;
        let mut requeued = 0usize;
        outcomes.retain(|o| {
            if !o.is_failed() {
                return true;
            }
            processed_ids.remove(&o.id);
            tallies.processed = tallies.processed.saturating_sub(1);
            tallies.failed = tallies.failed.saturating_sub(1);
            requeued += 1;
            false
        });
        info!(
            processed = tallies.processed,
            requeued,
            last_index = checkpoint.last_index,
            saved_at = %checkpoint.timestamp,
            "resuming from checkpoint"
        );

        Ok(Progress {
            tallies,
            processed_ids,
            outcomes,
            prior_log: Vec::new(),
        })
    }

    /// Persist the outcome log, then the checkpoint unless this is a retry-failed run.
    fn flush(&self, progress: &Progress, config: &RunConfig) -> Result<()> {
        self.reporter.write_outcomes(&progress.log())?;
        if config.retry_failed {
            return Ok(());
        }
        self.store.save(&Checkpoint::new(
            progress.tallies,
            progress.processed_ids.clone(),
            config.dry_run,
        ))
    }
}

fn mode_name(dry_run: bool) -> &'static str {
    if dry_run {
        "dry"
    } else {
        "real"
    }
}

/// Sleep for `delay`. Returns true if `cancel` fired first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn log_outcome(outcome: &UpdateOutcome, position: u64, total: usize) {
    let progress = format!("{}/{}", position, total);
    match &outcome.kind {
        OutcomeKind::Updated { signature, .. } => info!(
            %progress,
            id = %outcome.id,
            status = outcome.label(),
            signature = signature.as_deref().unwrap_or("-"),
            "record updated"
        ),
        OutcomeKind::Skipped { reason } => {
            info!(%progress, id = %outcome.id, %reason, "record skipped")
        }
        OutcomeKind::Failed { reason } => {
            warn!(%progress, id = %outcome.id, %reason, "record failed")
        }
    }
}
