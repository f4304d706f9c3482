//! Crash-consistent run state for metadata-batch.
//!
//! This crate provides:
//! - `CheckpointStore`: save/load/delete of the resumable progress marker
//! - `paths`: the log-directory layout and whole-file replace JSON writes shared by
//!   every run artifact (outcome log, summary, failed ids)

pub mod paths;
pub mod store;

pub use paths::{atomic_write, atomic_write_json, read_json};
pub use store::{Checkpoint, CheckpointStore};
