//! Keypair-file signer.
//!
//! Key files are JSON arrays of 64 bytes: the 32-byte ed25519 secret followed by the
//! 32-byte public key (the format written by the usual CLI wallet tooling).

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use metadata_batch_types::Address;
use std::path::Path;

use crate::{Signature, Signer};

pub struct KeypairSigner {
    key: SigningKey,
    address: Address,
}

impl KeypairSigner {
    /// Load a signer from a keypair JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypair file {}", path.display()))?;
        let bytes: Vec<u8> = serde_json::from_str(&json).with_context(|| {
            format!(
                "Keypair file {} is not a JSON array of bytes",
                path.display()
            )
        })?;
        Self::from_keypair_bytes(&bytes)
            .with_context(|| format!("Invalid keypair in {}", path.display()))
    }

    /// Build from 64 keypair bytes (secret ‖ public); the public half must match.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| anyhow!("expected 64 keypair bytes, got {}", bytes.len()))?;
        let key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| anyhow!("keypair public key does not match secret: {}", e))?;
        Ok(Self::from_signing_key(key))
    }

    /// Build from a 32-byte secret.
    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&secret))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = Address::new(key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// 64 keypair bytes in key-file order.
    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.key.to_keypair_bytes()
    }
}

impl Signer for KeypairSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.key.sign(message).to_bytes())
    }
}
