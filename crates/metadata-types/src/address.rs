//! Ledger address type.
//!
//! Record accounts, authorities and programs are all addressed by 32-byte keys.
//! Their text form is base58 (the usual 32-44 character encoding), which is what
//! manifests, RPC payloads and checkpoint files carry.
//!
//! ```
//! use metadata_batch_types::Address;
//!
//! let program: Address = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s".parse().unwrap();
//! assert_eq!(program.to_string(), "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 32-byte ledger key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// Length of an address in bytes.
    pub const LENGTH: usize = 32;

    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build an address from a slice, returning `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Consume the address, returning the raw key bytes.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Why a string could not be parsed as an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// The input was empty after trimming.
    Empty,
    /// The input is not valid base58.
    InvalidBase58 { input: String },
    /// The input decoded to the wrong number of bytes.
    WrongLength { input: String, length: usize },
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::Empty => write!(f, "address is empty"),
            AddressParseError::InvalidBase58 { input } => {
                write!(f, "address '{}' is not valid base58", input)
            }
            AddressParseError::WrongLength { input, length } => write!(
                f,
                "address '{}' decodes to {} bytes, expected {}",
                input,
                length,
                Address::LENGTH
            ),
        }
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressParseError::InvalidBase58 {
                input: s.to_string(),
            })?;
        Address::from_slice(&bytes).ok_or_else(|| AddressParseError::WrongLength {
            input: s.to_string(),
            length: bytes.len(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
