//! Instructions and the legacy transaction wire format.
//!
//! A transaction is `compact_u16(sig_count) ‖ signatures ‖ message`, where the message is
//!
//! ```text
//! header: [num_required_signatures, num_readonly_signed, num_readonly_unsigned]
//! compact_u16(key_count) ‖ keys (32 bytes each)
//! recent_blockhash (32 bytes)
//! compact_u16(ix_count) ‖ for each: program_index ‖ compact_u16(n) ‖ account indices
//!                                   ‖ compact_u16(len) ‖ data
//! ```
//!
//! Keys are ordered writable signers, read-only signers, writable non-signers,
//! read-only non-signers, with the fee payer always first.

use anyhow::{anyhow, Result};
use metadata_batch_types::Address;

use crate::Signature;

/// One account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A compiled legacy message, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Address>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Clone, Copy)]
struct KeyFlags {
    address: Address,
    is_signer: bool,
    is_writable: bool,
}

impl Message {
    /// Compile instructions into a message paid for by `fee_payer`.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Address,
        recent_blockhash: [u8; 32],
    ) -> Result<Self> {
        let mut keys: Vec<KeyFlags> = vec![KeyFlags {
            address: *fee_payer,
            is_signer: true,
            is_writable: true,
        }];
        let mut merge = |address: Address, is_signer: bool, is_writable: bool| {
            if let Some(existing) = keys.iter_mut().find(|k| k.address == address) {
                existing.is_signer |= is_signer;
                existing.is_writable |= is_writable;
            } else {
                keys.push(KeyFlags {
                    address,
                    is_signer,
                    is_writable,
                });
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                merge(meta.address, meta.is_signer, meta.is_writable);
            }
            merge(ix.program_id, false, false);
        }

        // Stable partition keeps the fee payer first and preserves first-seen order.
        let rank = |k: &KeyFlags| match (k.is_signer, k.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        keys.sort_by_key(rank);

        if keys.len() > u8::MAX as usize + 1 {
            return Err(anyhow!(
                "message references {} accounts, at most 256 are addressable",
                keys.len()
            ));
        }

        let header = MessageHeader {
            num_required_signatures: keys.iter().filter(|k| k.is_signer).count() as u8,
            num_readonly_signed: keys
                .iter()
                .filter(|k| k.is_signer && !k.is_writable)
                .count() as u8,
            num_readonly_unsigned: keys
                .iter()
                .filter(|k| !k.is_signer && !k.is_writable)
                .count() as u8,
        };
        let account_keys: Vec<Address> = keys.iter().map(|k| k.address).collect();
        let index_of = |address: &Address| -> Result<u8> {
            account_keys
                .iter()
                .position(|k| k == address)
                .map(|i| i as u8)
                .ok_or_else(|| anyhow!("account {} missing from message keys", address))
        };

        let compiled = instructions
            .iter()
            .map(|ix| -> Result<CompiledInstruction> {
                Ok(CompiledInstruction {
                    program_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| index_of(&meta.address))
                        .collect::<Result<Vec<_>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    /// Addresses that must sign, in signature order.
    pub fn signers(&self) -> &[Address] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    /// Serialize the message bytes that signers sign.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.account_keys.len() * 32);
        buf.push(self.header.num_required_signatures);
        buf.push(self.header.num_readonly_signed);
        buf.push(self.header.num_readonly_unsigned);
        write_compact_u16(&mut buf, self.account_keys.len() as u16);
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }
        buf.extend_from_slice(&self.recent_blockhash);
        write_compact_u16(&mut buf, self.instructions.len() as u16);
        for ix in &self.instructions {
            buf.push(ix.program_index);
            write_compact_u16(&mut buf, ix.accounts.len() as u16);
            buf.extend_from_slice(&ix.accounts);
            write_compact_u16(&mut buf, ix.data.len() as u16);
            buf.extend_from_slice(&ix.data);
        }
        buf
    }
}

/// Assemble the wire transaction from signatures and serialized message bytes.
pub fn encode_transaction(signatures: &[Signature], message: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
    write_compact_u16(&mut buf, signatures.len() as u16);
    for sig in signatures {
        buf.extend_from_slice(sig);
    }
    buf.extend_from_slice(message);
    buf
}

/// Variable-length u16: 7 bits per byte, high bit set on every byte but the last.
pub fn write_compact_u16(buf: &mut Vec<u8>, value: u16) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            buf.push(byte);
            return;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}
