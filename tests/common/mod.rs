#![allow(dead_code, unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `mocks`: in-memory ledger implementing `RemoteClient`
//! - `fixtures`: record, signer, manifest and config builders

pub mod fixtures;
pub mod mocks;

pub use fixtures::{
    address, authority, fast_config, on_chain, target, write_keypair, write_manifest,
};
pub use mocks::FakeLedger;
