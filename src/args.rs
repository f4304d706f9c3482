//! Command-line and environment settings, validated into run and retry configs.

use clap::Parser;
use metadata_batch_types::RetryConfig;
use metadata_transport::Commitment;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::RunConfig;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "metadata-batch",
    author,
    version,
    about = "Batch-update token metadata records from a CSV manifest"
)]
pub struct Args {
    /// JSON-RPC endpoint.
    #[arg(long, env = "RPC_URL", default_value = "https://api.devnet.solana.com")]
    pub rpc_url: String,

    /// Manifest CSV (`id,record_data,image,status`).
    #[arg(long, env = "MANIFEST_PATH", value_name = "PATH")]
    pub manifest: PathBuf,

    /// Keypair JSON file of the update authority (64-byte array).
    #[arg(long, env = "KEYPAIR_PATH", value_name = "PATH")]
    pub keypair: PathBuf,

    /// Directory for checkpoint, outcome log, summary and failed ids.
    #[arg(long, env = "LOG_DIR", default_value = "logs", value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Records per chunk.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 10)]
    pub chunk_size: usize,

    /// Pause between chunks in milliseconds.
    #[arg(long, env = "CHUNK_DELAY_MS", default_value_t = 2000)]
    pub chunk_delay_ms: u64,

    /// Pause between records in milliseconds.
    #[arg(long, env = "RECORD_DELAY_MS", default_value_t = 100)]
    pub record_delay_ms: u64,

    /// Fetch and compare only; never submit.
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Retries after the first attempt of each fetch or submit.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds (doubled per retry).
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Save a checkpoint every N processed records.
    #[arg(long, env = "CHECKPOINT_INTERVAL", default_value_t = 10)]
    pub checkpoint_interval: usize,

    /// Continue from the checkpoint in the log directory.
    #[arg(long, env = "RESUME", conflicts_with = "retry_failed")]
    pub resume: bool,

    /// Only process manifest records START through END (zero-based, inclusive).
    #[arg(long, env = "RANGE", value_name = "START-END")]
    pub range: Option<String>,

    /// Only process the ids listed in `<log-dir>/failed_ids.json`.
    #[arg(long)]
    pub retry_failed: bool,

    /// Commitment level a submission must reach.
    #[arg(long, env = "COMMITMENT", default_value = "confirmed")]
    pub commitment: String,

    /// Log filter (e.g. `info`, `debug`, `metadata_batch=trace`). Defaults to `RUST_LOG`, then `info`.
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

/// A rejected `START-END` range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    Syntax { input: String },
    Reversed { start: usize, end: usize },
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Syntax { input } => write!(
                f,
                "invalid range '{}': expected START-END with non-negative integers",
                input
            ),
            RangeError::Reversed { start, end } => {
                write!(f, "invalid range: start {} is greater than end {}", start, end)
            }
        }
    }
}

impl std::error::Error for RangeError {}

/// Parse an inclusive `START-END` range.
pub fn parse_range(input: &str) -> Result<RangeInclusive<usize>, RangeError> {
    let syntax = || RangeError::Syntax {
        input: input.to_string(),
    };
    let (start, end) = input.trim().split_once('-').ok_or_else(syntax)?;
    let start = usize::from_str(start.trim()).map_err(|_| syntax())?;
    let end = usize::from_str(end.trim()).map_err(|_| syntax())?;
    if start > end {
        return Err(RangeError::Reversed { start, end });
    }
    Ok(start..=end)
}

/// Apply an inclusive range to `items`, clamping the end to the last element.
pub fn select_range<'a, T>(items: &'a [T], range: &RangeInclusive<usize>) -> &'a [T] {
    let start = (*range.start()).min(items.len());
    let end = range.end().saturating_add(1).min(items.len());
    &items[start..end]
}

impl Args {
    /// Check every setting that can be checked without network access.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("--chunk-size must be at least 1");
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("--checkpoint-interval must be at least 1");
        }
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!("--rpc-url must not be empty");
        }
        if !self.manifest.is_file() {
            anyhow::bail!("manifest not found: {}", self.manifest.display());
        }
        if !self.keypair.is_file() {
            anyhow::bail!("keypair file not found: {}", self.keypair.display());
        }
        self.range()?;
        self.commitment()?;
        Ok(())
    }

    pub fn range(&self) -> anyhow::Result<Option<RangeInclusive<usize>>> {
        match &self.range {
            Some(r) => Ok(Some(parse_range(r)?)),
            None => Ok(None),
        }
    }

    pub fn commitment(&self) -> anyhow::Result<Commitment> {
        Commitment::from_str(&self.commitment).map_err(|e| anyhow::anyhow!(e))
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            record_delay: Duration::from_millis(self.record_delay_ms),
            checkpoint_interval: self.checkpoint_interval,
            dry_run: self.dry_run,
            resume: self.resume,
            retry_failed: self.retry_failed,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0-9"), Ok(0..=9));
        assert_eq!(parse_range(" 5 - 5 "), Ok(5..=5));
        assert_eq!(
            parse_range("9-3"),
            Err(RangeError::Reversed { start: 9, end: 3 })
        );
        for bad in ["", "7", "a-b", "-1-4", "3-", "1-2-3"] {
            assert!(
                matches!(parse_range(bad), Err(RangeError::Syntax { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_select_range_clamps() {
        let items = [0, 1, 2, 3, 4];
        assert_eq!(select_range(&items, &(1..=3)), &[1, 2, 3]);
        assert_eq!(select_range(&items, &(3..=100)), &[3, 4]);
        assert!(select_range(&items, &(8..=9)).is_empty());
        assert_eq!(select_range(&items, &(0..=usize::MAX)), &items);
    }

    #[test]
    fn test_selection_outlives_parsed_range() {
        let items = vec!["a", "b", "c", "d"];
        let picked = {
            let range = parse_range("1-2").unwrap();
            select_range(&items, &range)
        };
        assert_eq!(picked, &["b", "c"]);
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from([
            "metadata-batch",
            "--manifest",
            "m.csv",
            "--keypair",
            "id.json",
        ])
        .unwrap();
        let config = args.run_config();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.chunk_delay, Duration::from_millis(2000));
        assert_eq!(config.checkpoint_interval, 10);
        assert!(!config.dry_run && !config.resume && !config.retry_failed);
        assert_eq!(args.retry_config(), RetryConfig::new(3, 1000));
        assert_eq!(args.commitment().unwrap(), Commitment::Confirmed);
    }

    #[test]
    fn test_resume_conflicts_with_retry_failed() {
        let result = Args::try_parse_from([
            "metadata-batch",
            "--manifest",
            "m.csv",
            "--keypair",
            "id.json",
            "--resume",
            "--retry-failed",
        ]);
        assert!(result.is_err());
    }
}
