//! Packed Transaction Support for the Plasma chain
//!
//! This module provides the binary transaction layout the chain expects in
//! `push_transaction`, account-name encoding, and the digest that gets signed.

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Characters allowed in an account name, indexed by their 5-bit symbol
const NAME_CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Block timestamps are UTC without a zone suffix, e.g. `2024-03-01T12:00:00.500`
const BLOCK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("Invalid account name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
    #[error("Invalid block timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Packed transaction truncated at byte {0}")]
    Truncated(usize),
    #[error("Varuint32 overflow at byte {0}")]
    VaruintOverflow(usize),
    #[error("Unsupported in packed transaction: {0}")]
    Unsupported(&'static str),
    #[error("{0} trailing bytes after packed transaction")]
    TrailingBytes(usize),
}

// ============================================================================
// ACCOUNT NAMES
// ============================================================================

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

/// Encode an account or action name into its 64-bit on-chain form.
///
/// The first 12 characters take 5 bits each; an optional 13th character
/// takes the low 4 bits and is limited to `.12345a-j`.
pub fn encode_name(name: &str) -> Result<u64, PackError> {
    let invalid = |reason: &str| PackError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let bytes = name.as_bytes();
    if bytes.len() > 13 {
        return Err(invalid("longer than 13 characters"));
    }

    let mut value = 0u64;
    for (i, &c) in bytes.iter().enumerate() {
        let symbol = char_to_symbol(c).ok_or_else(|| invalid("allowed characters are .12345a-z"))?;
        if i < 12 {
            value |= (symbol & 0x1f) << (64 - 5 * (i + 1));
        } else {
            if symbol > 0x0f {
                return Err(invalid("13th character must be one of .12345a-j"));
            }
            value |= symbol;
        }
    }

    Ok(value)
}

/// Decode a 64-bit name back to its string form, trailing dots trimmed
pub fn decode_name(value: u64) -> String {
    let mut out = [b'.'; 13];
    let mut tmp = value;
    for i in 0..13 {
        let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
        out[12 - i] = NAME_CHARMAP[(tmp & mask) as usize];
        tmp >>= shift;
    }

    String::from_utf8_lossy(&out)
        .trim_end_matches('.')
        .to_string()
}

// ============================================================================
// BLOCK TIME
// ============================================================================

/// Parse a block timestamp into whole seconds since the Unix epoch,
/// rounding half-second block slots to the nearest second.
pub fn block_time_to_secs(timestamp: &str) -> Result<u32, PackError> {
    let parsed = NaiveDateTime::parse_from_str(timestamp, BLOCK_TIMESTAMP_FORMAT)
        .map_err(|e| PackError::InvalidTimestamp(format!("{}: {}", timestamp, e)))?;

    let millis = parsed.and_utc().timestamp_millis();
    let secs = (millis + 500) / 1000;

    u32::try_from(secs)
        .map_err(|_| PackError::InvalidTimestamp(format!("{} is out of range", timestamp)))
}

// ============================================================================
// PACKED TYPES
// ============================================================================

/// A permission level with both names already encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedPermission {
    pub actor: u64,
    pub permission: u64,
}

/// An action ready for packing; `data` is the ABI-serialized payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedAction {
    pub account: u64,
    pub name: u64,
    pub authorization: Vec<PackedPermission>,
    pub data: Vec<u8>,
}

/// Transaction header plus actions, in the chain's binary layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Unix seconds after which the chain rejects the transaction
    pub expiration: u32,
    /// Low 16 bits of the reference block number
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub max_net_usage_words: u32,
    pub max_cpu_usage_ms: u8,
    pub delay_sec: u32,
    pub actions: Vec<PackedAction>,
}

impl Transaction {
    /// Create a transaction referencing `ref_block_num` that expires at `expiration`
    pub fn new(
        expiration: u32,
        ref_block_num: u32,
        ref_block_prefix: u32,
        actions: Vec<PackedAction>,
    ) -> Self {
        Transaction {
            expiration,
            ref_block_num: (ref_block_num & 0xffff) as u16,
            ref_block_prefix,
            max_net_usage_words: 0,
            max_cpu_usage_ms: 0,
            delay_sec: 0,
            actions,
        }
    }

    /// Serialize to the packed form sent as `packed_trx`
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);

        buf.extend_from_slice(&self.expiration.to_le_bytes());
        buf.extend_from_slice(&self.ref_block_num.to_le_bytes());
        buf.extend_from_slice(&self.ref_block_prefix.to_le_bytes());
        write_varuint32(&mut buf, self.max_net_usage_words);
        buf.push(self.max_cpu_usage_ms);
        write_varuint32(&mut buf, self.delay_sec);

        // No context-free actions
        write_varuint32(&mut buf, 0);

        write_varuint32(&mut buf, self.actions.len() as u32);
        for action in &self.actions {
            buf.extend_from_slice(&action.account.to_le_bytes());
            buf.extend_from_slice(&action.name.to_le_bytes());
            write_varuint32(&mut buf, action.authorization.len() as u32);
            for level in &action.authorization {
                buf.extend_from_slice(&level.actor.to_le_bytes());
                buf.extend_from_slice(&level.permission.to_le_bytes());
            }
            write_varuint32(&mut buf, action.data.len() as u32);
            buf.extend_from_slice(&action.data);
        }

        // No transaction extensions
        write_varuint32(&mut buf, 0);

        buf
    }

    /// Parse a packed transaction. Context-free actions and extensions must be empty.
    pub fn unpack(bytes: &[u8]) -> Result<Self, PackError> {
        let mut reader = Reader { bytes, pos: 0 };

        let expiration = u32::from_le_bytes(reader.take_array()?);
        let ref_block_num = u16::from_le_bytes(reader.take_array()?);
        let ref_block_prefix = u32::from_le_bytes(reader.take_array()?);
        let max_net_usage_words = reader.varuint32()?;
        let max_cpu_usage_ms = reader.take_array::<1>()?[0];
        let delay_sec = reader.varuint32()?;

        let context_free = reader.varuint32()?;
        if context_free != 0 {
            return Err(PackError::Unsupported("context-free actions"));
        }

        let action_count = reader.varuint32()?;
        // Counts come from the input; an action takes at least 18 bytes
        let mut actions = Vec::with_capacity(reader.capacity_for(action_count, 18));
        for _ in 0..action_count {
            let account = u64::from_le_bytes(reader.take_array()?);
            let name = u64::from_le_bytes(reader.take_array()?);
            let auth_count = reader.varuint32()?;
            let mut authorization = Vec::with_capacity(reader.capacity_for(auth_count, 16));
            for _ in 0..auth_count {
                authorization.push(PackedPermission {
                    actor: u64::from_le_bytes(reader.take_array()?),
                    permission: u64::from_le_bytes(reader.take_array()?),
                });
            }
            let data_len = reader.varuint32()? as usize;
            let data = reader.take(data_len)?.to_vec();
            actions.push(PackedAction { account, name, authorization, data });
        }

        if reader.varuint32()? != 0 {
            return Err(PackError::Unsupported("transaction extensions"));
        }
        if reader.pos != bytes.len() {
            return Err(PackError::TrailingBytes(bytes.len() - reader.pos));
        }

        Ok(Transaction {
            expiration,
            ref_block_num,
            ref_block_prefix,
            max_net_usage_words,
            max_cpu_usage_ms,
            delay_sec,
            actions,
        })
    }

    /// Digest to sign: SHA256(chain_id || packed_trx || context_free_data_digest)
    ///
    /// With no context-free data the trailing digest is 32 zero bytes.
    pub fn signing_digest(&self, chain_id: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(chain_id);
        hasher.update(self.pack());
        hasher.update([0u8; 32]);
        hasher.finalize().into()
    }

    /// Transaction id as reported by the chain
    pub fn id(&self) -> String {
        transaction_id(&self.pack())
    }

    /// Check if the transaction has expired at `now_secs`
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expiration as u64
    }
}

/// SHA256 of the packed transaction, hex-encoded
pub fn transaction_id(packed_trx: &[u8]) -> String {
    hex::encode(Sha256::digest(packed_trx))
}

fn write_varuint32(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Capacity for `count` items of at least `min_size` bytes, bounded by what is left
    fn capacity_for(&self, count: u32, min_size: usize) -> usize {
        (count as usize).min((self.bytes.len() - self.pos) / min_size)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(PackError::Truncated(self.pos)),
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PackError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn varuint32(&mut self) -> Result<u32, PackError> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.take_array::<1>()?[0];
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(PackError::VaruintOverflow(start));
            }
        }
        u32::try_from(value).map_err(|_| PackError::VaruintOverflow(start))
    }
}

// ============================================================================
// TESTS
// ============================================================================
