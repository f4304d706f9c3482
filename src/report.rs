//! Run artifacts written to the log directory.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metadata_batch_types::{Address, Tallies, TargetRecord, UpdateOutcome};
use metadata_checkpoint::paths::{failed_ids_path, summary_path, update_log_path};
use metadata_checkpoint::{atomic_write_json, read_json};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Flat per-transaction fee used for the cost estimate.
pub const AVERAGE_FEE_SOL: f64 = 0.000005;

/// Aggregate result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records handed to the run, including ones a resumed run had already processed.
    pub total: usize,
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub dry_run: bool,
    pub cancelled: bool,
    /// `updated * AVERAGE_FEE_SOL`; zero for dry runs.
    pub estimated_cost_sol: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl RunSummary {
    /// Summarize an outcome log.
    pub fn from_outcomes(
        total: usize,
        outcomes: &[UpdateOutcome],
        dry_run: bool,
        cancelled: bool,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let mut tallies = Tallies::default();
        for outcome in outcomes {
            tallies.record(outcome);
        }
        let estimated_cost_sol = if dry_run {
            0.0
        } else {
            tallies.updated as f64 * AVERAGE_FEE_SOL
        };
        let duration_secs = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            total,
            processed: tallies.processed,
            updated: tallies.updated,
            skipped: tallies.skipped,
            failed: tallies.failed,
            dry_run,
            cancelled,
            estimated_cost_sol,
            started_at,
            finished_at,
            duration_secs,
        }
    }

    pub fn tallies(&self) -> Tallies {
        Tallies {
            processed: self.processed,
            updated: self.updated,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Contents of `failed_ids.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedIds {
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    pub ids: Vec<Address>,
}

/// Reads and writes the outcome log, summary and failed-id list of one log directory.
#[derive(Debug, Clone)]
pub struct RunReporter {
    log_dir: PathBuf,
}

impl RunReporter {
    pub fn new<P: Into<PathBuf>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Replace `update_log.json` with `outcomes`.
    pub fn write_outcomes(&self, outcomes: &[UpdateOutcome]) -> Result<()> {
        atomic_write_json(&update_log_path(&self.log_dir), &outcomes)
    }

    /// Outcomes from a previous run, empty if there is no log.
    pub fn load_outcomes(&self) -> Result<Vec<UpdateOutcome>> {
        Ok(read_json(&update_log_path(&self.log_dir))?.unwrap_or_default())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        atomic_write_json(&summary_path(&self.log_dir), summary)
    }

    pub fn load_summary(&self) -> Result<Option<RunSummary>> {
        read_json(&summary_path(&self.log_dir))
    }

    pub fn write_failed_ids(&self, ids: &[Address]) -> Result<()> {
        let failed = FailedIds {
            timestamp: Utc::now(),
            count: ids.len(),
            ids: ids.to_vec(),
        };
        atomic_write_json(&failed_ids_path(&self.log_dir), &failed)
    }

    pub fn load_failed_ids(&self) -> Result<Option<FailedIds>> {
        read_json(&failed_ids_path(&self.log_dir))
    }

    /// The records of `records` listed in `failed_ids.json`, in manifest order.
    pub fn failed_subset(&self, records: &[TargetRecord]) -> Result<Vec<TargetRecord>> {
        let failed = self.load_failed_ids()?.ok_or_else(|| {
            anyhow!(
                "no failed_ids.json in {}, nothing to retry",
                self.log_dir.display()
            )
        })?;
        let wanted: HashSet<Address> = failed.ids.into_iter().collect();
        Ok(records
            .iter()
            .filter(|r| wanted.contains(&r.id))
            .cloned()
            .collect())
    }

    /// Remove a failed-id list left by an earlier run. Returns whether one existed.
    pub fn clear_failed_ids(&self) -> Result<bool> {
        let path = failed_ids_path(&self.log_dir);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .map_err(|e| anyhow!("Failed to delete {}: {}", path.display(), e))?;
        Ok(true)
    }
}

/// `prior` with each entry replaced by the `fresh` outcome for the same id.
///
/// Fresh outcomes for ids absent from `prior` are appended in their own order.
pub fn merge_outcomes(prior: &[UpdateOutcome], fresh: &[UpdateOutcome]) -> Vec<UpdateOutcome> {
    let by_id: HashMap<Address, &UpdateOutcome> = fresh.iter().map(|o| (o.id, o)).collect();
    let known: HashSet<Address> = prior.iter().map(|o| o.id).collect();
    prior
        .iter()
        .map(|o| by_id.get(&o.id).map_or_else(|| o.clone(), |&fresh| fresh.clone()))
        .chain(fresh.iter().filter(|o| !known.contains(&o.id)).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use metadata_batch_types::{OutcomeKind, RecordFields};
    use tempfile::TempDir;

    fn fields(name: &str) -> RecordFields {
        RecordFields {
            name: name.into(),
            symbol: "S".into(),
            uri: "u".into(),
        }
    }

    fn updated(b: u8, simulated: bool) -> UpdateOutcome {
        UpdateOutcome::new(
            Address::new([b; 32]),
            OutcomeKind::Updated {
                old: fields("old"),
                new: fields("new"),
                signature: (!simulated).then(|| "sig".to_string()),
                simulated,
            },
        )
    }

    #[test]
    fn test_summary_counts_and_cost() {
        let started = Utc::now();
        let outcomes = vec![
            updated(1, false),
            updated(2, false),
            UpdateOutcome::skipped(Address::new([3; 32]), "no changes"),
            UpdateOutcome::failed(Address::new([4; 32]), "boom"),
        ];
        let summary = RunSummary::from_outcomes(
            5,
            &outcomes,
            false,
            false,
            started,
            started + Duration::milliseconds(2500),
        );
        assert_eq!(summary.total, 5);
        assert_eq!(
            summary.tallies(),
            Tallies {
                processed: 4,
                updated: 2,
                skipped: 1,
                failed: 1,
            }
        );
        assert!((summary.estimated_cost_sol - 0.00001).abs() < 1e-12);
        assert!((summary.duration_secs - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_dry_run_costs_nothing() {
        let now = Utc::now();
        let summary =
            RunSummary::from_outcomes(1, &[updated(1, true)], true, false, now, now);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.estimated_cost_sol, 0.0);
    }

    #[test]
    fn test_artifacts_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let reporter = RunReporter::new(dir.path().join("logs"));

        assert!(reporter.load_outcomes()?.is_empty());
        assert!(reporter.load_failed_ids()?.is_none());

        let outcomes = vec![updated(1, false), UpdateOutcome::failed(Address::new([2; 32]), "x")];
        reporter.write_outcomes(&outcomes)?;
        assert_eq!(reporter.load_outcomes()?, outcomes);

        reporter.write_failed_ids(&[Address::new([2; 32])])?;
        let failed = reporter.load_failed_ids()?.unwrap();
        assert_eq!(failed.count, 1);
        assert_eq!(failed.ids, vec![Address::new([2; 32])]);

        assert!(reporter.clear_failed_ids()?);
        assert!(!reporter.clear_failed_ids()?);
        Ok(())
    }

    #[test]
    fn test_merge_replaces_retried_entries_in_place() {
        let (a, b, c) = (Address::new([1; 32]), Address::new([2; 32]), Address::new([3; 32]));
        let prior = vec![
            updated(1, false),
            UpdateOutcome::failed(b, "timeout"),
            UpdateOutcome::skipped(c, "no changes"),
        ];
        let fresh = vec![updated(2, false), UpdateOutcome::failed(Address::new([4; 32]), "x")];

        let merged = merge_outcomes(&prior, &fresh);

        let ids: Vec<_> = merged.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![a, b, c, Address::new([4; 32])]);
        assert_eq!(merged[0], prior[0]);
        assert_eq!(merged[1], fresh[0]);
        assert_eq!(merged[2], prior[2]);
    }

    #[test]
    fn test_failed_subset_requires_failed_list() -> Result<()> {
        let dir = TempDir::new()?;
        let reporter = RunReporter::new(dir.path());
        let records: Vec<TargetRecord> = (1..=3u8)
            .map(|b| TargetRecord {
                id: Address::new([b; 32]),
                name: "n".into(),
                symbol: "S".into(),
                uri: "u".into(),
            })
            .collect();

        let err = reporter.failed_subset(&records).unwrap_err();
        assert!(err.to_string().contains("nothing to retry"));

        reporter.write_failed_ids(&[
            Address::new([3; 32]),
            Address::new([9; 32]),
            Address::new([1; 32]),
        ])?;
        let subset = reporter.failed_subset(&records)?;
        let ids: Vec<_> = subset.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Address::new([1; 32]), Address::new([3; 32])]);
        Ok(())
    }

    #[test]
    fn test_outcome_log_format() -> Result<()> {
        let outcome = UpdateOutcome::skipped(Address::new([7; 32]), "no changes");
        let value = serde_json::to_value(&outcome)?;
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "no changes");
        assert_eq!(value["id"], Address::new([7; 32]).to_string());
        Ok(())
    }
}
