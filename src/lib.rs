//! Batch updater for on-chain token metadata records.
//!
//! Reads a CSV manifest of target values and brings each record on the ledger to that
//! state, one record at a time:
//!
//! - **Codec**: decode metadata accounts, encode update instructions ([`codec`])
//! - **Update protocol**: fetch, authorize, diff, then submit or simulate ([`engine`])
//! - **Batch runs**: chunking, rate limiting, checkpoints and resume ([`orchestrator`])
//!
//! Ledger access and signing live in `metadata-transport`; checkpoint persistence in
//! `metadata-checkpoint`.

pub mod args;
pub mod authority;
pub mod codec;
pub mod diff;
pub mod engine;
pub mod manifest;
pub mod orchestrator;
pub mod report;
pub mod retry;

pub use engine::{UpdateEngine, UpdateError};
pub use orchestrator::{BatchOrchestrator, RunConfig, RunReport};
pub use report::{RunReporter, RunSummary};
