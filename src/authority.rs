//! Update-authority gate.

use std::fmt;

use metadata_batch_types::{Address, OnChainRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The record's stored authority is not the caller.
    Mismatch { expected: Address, found: Address },
}

impl fmt::Display for AuthorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorityError::Mismatch { expected, found } => write!(
                f,
                "update authority mismatch: expected {}, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for AuthorityError {}

/// Check that `caller` may mutate `record`.
///
/// `expected` in the error is the caller's identity and `found` is the authority
/// stored on the record.
pub fn authorize(record: &OnChainRecord, caller: &Address) -> Result<(), AuthorityError> {
    if record.authority == *caller {
        Ok(())
    } else {
        Err(AuthorityError::Mismatch {
            expected: *caller,
            found: record.authority,
        })
    }
}
