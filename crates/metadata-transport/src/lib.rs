//! Ledger transport for metadata-batch.
//!
//! This crate provides:
//! - [`RemoteClient`]: the two ledger capabilities the update engine needs
//!   (read raw account bytes, submit a signed instruction)
//! - [`Signer`]: signing abstraction so key material never reaches the engine
//! - [`instruction`]: instructions and the legacy transaction wire format
//! - [`rpc`]: JSON-RPC implementation of [`RemoteClient`]
//! - [`signer`]: keypair-file implementation of [`Signer`]
//!
//! # Example
//!
//! ```ignore
//! use metadata_transport::{RemoteClient, RpcClient, KeypairSigner};
//!
//! let client = RpcClient::new("https://api.devnet.solana.com");
//! let raw = client.fetch_raw(&record_address).await?;
//! ```

pub mod instruction;
pub mod rpc;
pub mod signer;

// Re-export main types for convenience
pub use instruction::{AccountMeta, Instruction, Message};
pub use rpc::{Commitment, RpcClient};
pub use signer::KeypairSigner;

use anyhow::Result;
use metadata_batch_types::Address;

/// Ed25519 signature bytes.
pub type Signature = [u8; 64];

/// Produces signatures for transaction messages.
pub trait Signer: Send + Sync {
    /// Address of the signing key (also the fee payer).
    fn address(&self) -> Address;

    /// Sign a serialized transaction message.
    fn sign(&self, message: &[u8]) -> Result<Signature>;
}

/// Ledger capabilities used by the update engine.
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch raw account bytes. `Ok(None)` means the account does not exist.
    async fn fetch_raw(&self, address: &Address) -> Result<Option<Vec<u8>>>;

    /// Sign and submit a transaction carrying `instruction`, returning its confirmation id
    /// once the transaction is confirmed.
    async fn submit(&self, instruction: &Instruction, signer: &dyn Signer) -> Result<String>;
}
