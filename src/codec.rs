//! Binary layout of token metadata accounts and the update instruction.
//!
//! ## Account layout
//!
//! ```text
//! offset  size  field
//! 0       1     account key (discriminator, ignored)
//! 1       32    update authority
//! 33      32    mint (ignored)
//! 65      4+n   name    (u32 LE length, UTF-8, NUL padded on chain)
//! ..      4+n   symbol
//! ..      4+n   uri
//! ```
//!
//! Anything after `uri` (fees, creators, flags) is not needed and not read.
//!
//! ## Update instruction data
//!
//! ```text
//! 15                      update-metadata v2 selector
//! 1                       Some(data)
//! name, symbol, uri       length-prefixed as above, unpadded
//! 0 0                     seller fee basis points (u16 LE)
//! 0                       creators:          None
//! 0                       collection:        None
//! 0                       uses:              None
//! 0                       update authority:  None
//! 0                       primary sale flag: None
//! 0                       is_mutable flag:   None
//! ```

use std::fmt;

use metadata_batch_types::{Address, OnChainRecord};
use metadata_transport::{AccountMeta, Instruction};

/// Token metadata program address (base58).
pub const METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

/// [`METADATA_PROGRAM_ID`] as raw key bytes.
pub const METADATA_PROGRAM: Address = Address::new([
    11, 112, 101, 177, 227, 209, 124, 69, 56, 157, 82, 127, 107, 4, 195, 205, 88, 184, 108, 115,
    26, 160, 253, 181, 73, 182, 209, 188, 3, 248, 41, 70,
]);

/// Instruction selector for update-metadata v2.
pub const UPDATE_METADATA_SELECTOR: u8 = 15;

/// Maximum on-chain field lengths in bytes.
pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;

const KEY_LENGTH: usize = 1;
const OPTION_SOME: u8 = 1;
const OPTION_NONE: u8 = 0;

/// Markers for the untouched optional fields, in declaration order.
const UNCHANGED_TAIL: [u8; 8] = [
    0, 0,           // seller fee basis points
    OPTION_NONE,    // creators
    OPTION_NONE,    // collection
    OPTION_NONE,    // uses
    OPTION_NONE,    // update authority
    OPTION_NONE,    // primary sale happened
    OPTION_NONE,    // is mutable
];

/// Why a byte buffer could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before `field` could be read.
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// `field` is not valid UTF-8.
    InvalidUtf8 { field: &'static str },
    /// `field` exceeds the on-chain maximum.
    FieldTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },
    /// The buffer is not an update-metadata instruction.
    UnexpectedInstruction { selector: u8 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated {
                field,
                offset,
                needed,
                available,
            } => write!(
                f,
                "malformed record: {} needs {} bytes at offset {} but only {} remain",
                field, needed, offset, available
            ),
            CodecError::InvalidUtf8 { field } => {
                write!(f, "malformed record: {} is not valid UTF-8", field)
            }
            CodecError::FieldTooLong { field, length, max } => write!(
                f,
                "{} is {} bytes, the maximum is {}",
                field, length, max
            ),
            CodecError::UnexpectedInstruction { selector } => write!(
                f,
                "instruction selector {} is not update-metadata ({})",
                selector, UPDATE_METADATA_SELECTOR
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Bounds-checked cursor over a byte buffer.
struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len().saturating_sub(self.offset);
        if len > available {
            return Err(CodecError::Truncated {
                field,
                offset: self.offset,
                needed: len,
                available,
            });
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(field, 1)?[0])
    }

    fn address(&mut self, field: &'static str) -> Result<Address, CodecError> {
        let bytes = self.take(field, Address::LENGTH)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Address::new(out))
    }

    /// Length-prefixed UTF-8 string with trailing NUL padding removed.
    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len_bytes = self.take(field, 4)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        let bytes = self.take(field, len as usize)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })?;
        Ok(text.trim_end_matches('\0').to_string())
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

/// Decode a metadata account.
pub fn decode(raw: &[u8]) -> Result<OnChainRecord, CodecError> {
    let mut reader = Reader::new(raw);
    reader.take("key", KEY_LENGTH)?;
    let authority = reader.address("update_authority")?;
    reader.take("mint", Address::LENGTH)?;
    let name = reader.string("name")?;
    let symbol = reader.string("symbol")?;
    let uri = reader.string("uri")?;
    Ok(OnChainRecord {
        authority,
        name,
        symbol,
        uri,
    })
}

/// Check field lengths against the on-chain maxima.
pub fn validate_lengths(name: &str, symbol: &str, uri: &str) -> Result<(), CodecError> {
    for (field, value, max) in [
        ("name", name, MAX_NAME_LENGTH),
        ("symbol", symbol, MAX_SYMBOL_LENGTH),
        ("uri", uri, MAX_URI_LENGTH),
    ] {
        if value.len() > max {
            return Err(CodecError::FieldTooLong {
                field,
                length: value.len(),
                max,
            });
        }
    }
    Ok(())
}

/// Encode update-metadata instruction data that rewrites name, symbol and uri and
/// leaves every other field unchanged.
pub fn encode_update_instruction(name: &str, symbol: &str, uri: &str) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(2 + 12 + name.len() + symbol.len() + uri.len() + UNCHANGED_TAIL.len());
    buf.push(UPDATE_METADATA_SELECTOR);
    buf.push(OPTION_SOME);
    write_string(&mut buf, name);
    write_string(&mut buf, symbol);
    write_string(&mut buf, uri);
    buf.extend_from_slice(&UNCHANGED_TAIL);
    buf
}

/// Fields carried by an update instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateData {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Decode instruction data produced by [`encode_update_instruction`].
pub fn decode_update_instruction(data: &[u8]) -> Result<UpdateData, CodecError> {
    let mut reader = Reader::new(data);
    let selector = reader.u8("selector")?;
    if selector != UPDATE_METADATA_SELECTOR {
        return Err(CodecError::UnexpectedInstruction { selector });
    }
    reader.u8("data_option")?;
    let name = reader.string("name")?;
    let symbol = reader.string("symbol")?;
    let uri = reader.string("uri")?;
    reader.take("unchanged_fields", UNCHANGED_TAIL.len())?;
    Ok(UpdateData { name, symbol, uri })
}

/// Build the update instruction for `record`, signed by `authority`.
pub fn build_update_instruction(
    record: &Address,
    authority: &Address,
    name: &str,
    symbol: &str,
    uri: &str,
) -> Instruction {
    Instruction {
        program_id: METADATA_PROGRAM,
        accounts: vec![
            AccountMeta::writable(*record, false),
            AccountMeta::readonly(*authority, true),
        ],
        data: encode_update_instruction(name, symbol, uri),
    }
}

/// Encode a metadata account with fields NUL-padded to their maximum length, the way
/// accounts are laid out on chain. Trailing fee/creator sections are zero-filled.
pub fn encode_account(record: &OnChainRecord, mint: &Address) -> Vec<u8> {
    let mut buf = Vec::with_capacity(KEY_LENGTH + 64 + 12 + 242 + 16);
    buf.push(4); // metadata account key
    buf.extend_from_slice(record.authority.as_bytes());
    buf.extend_from_slice(mint.as_bytes());
    for (value, max) in [
        (&record.name, MAX_NAME_LENGTH),
        (&record.symbol, MAX_SYMBOL_LENGTH),
        (&record.uri, MAX_URI_LENGTH),
    ] {
        let padded_len = value.len().max(max);
        let mut padded = value.as_bytes().to_vec();
        padded.resize(padded_len, 0);
        buf.extend_from_slice(&(padded_len as u32).to_le_bytes());
        buf.extend_from_slice(&padded);
    }
    buf.extend_from_slice(&[0u8; 16]);
    buf
}
