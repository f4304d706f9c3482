//! metadata-batch: bring token metadata records in line with a CSV manifest.
//!
//! ## Example Usage
//!
//! ```bash
//! # Preview what would change
//! metadata-batch --manifest nfts.csv --keypair ~/.config/solana/id.json --dry-run
//!
//! # Update records 0 through 99, then continue after an interruption
//! metadata-batch --manifest nfts.csv --keypair id.json --range 0-99
//! metadata-batch --manifest nfts.csv --keypair id.json --range 0-99 --resume
//!
//! # Re-run only the records that failed last time
//! metadata-batch --manifest nfts.csv --keypair id.json --retry-failed
//! ```
//!
//! Settings can also come from the environment or a `.env` file (`RPC_URL`,
//! `MANIFEST_PATH`, `KEYPAIR_PATH`, ...).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metadata_batch::args::{select_range, Args};
use metadata_batch::manifest::load_manifest;
use metadata_batch::{BatchOrchestrator, RunReporter, UpdateEngine};
use metadata_checkpoint::CheckpointStore;
use metadata_transport::{KeypairSigner, RpcClient, Signer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    args.validate()?;
    let commitment = args.commitment()?;

    let manifest = load_manifest(&args.manifest)?;
    if !manifest.errors.is_empty() {
        warn!(
            rejected = manifest.errors.len(),
            "manifest rows were rejected and will not be processed"
        );
    }
    let mut records = manifest.records;
    if let Some(range) = args.range()? {
        records = select_range(&records, &range).to_vec();
        info!(
            start = range.start(),
            end = range.end(),
            selected = records.len(),
            "range applied"
        );
    }

    let reporter = RunReporter::new(&args.log_dir);
    let config = args.run_config();
    if config.retry_failed {
        let candidates = records.len();
        records = reporter
            .failed_subset(&records)
            .context("--retry-failed")?;
        info!(
            candidates,
            matched = records.len(),
            "retrying previously failed records"
        );
    }

    let signer = Arc::new(KeypairSigner::from_file(&args.keypair)?);
    let client = RpcClient::with_commitment(&args.rpc_url, commitment);
    client
        .health()
        .await
        .with_context(|| format!("Cannot reach RPC endpoint {}", args.rpc_url))?;
    info!(
        rpc = %args.rpc_url,
        authority = %signer.address(),
        records = records.len(),
        dry_run = config.dry_run,
        "connected"
    );

    let engine = UpdateEngine::new(Arc::new(client), signer, args.retry_config());
    let orchestrator = BatchOrchestrator::new(engine, CheckpointStore::new(&args.log_dir), reporter);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current record");
            on_interrupt.cancel();
        }
    });

    let report = orchestrator.run(&records, &config, &cancel).await?;
    let summary = &report.summary;
    info!(
        total = summary.total,
        processed = summary.processed,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        estimated_cost_sol = summary.estimated_cost_sol,
        duration_secs = summary.duration_secs,
        cancelled = summary.cancelled,
        "run finished"
    );
    if !report.failed_ids.is_empty() {
        warn!(
            failed = report.failed_ids.len(),
            "re-run with --retry-failed to retry failed records"
        );
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
