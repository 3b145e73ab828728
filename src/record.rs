//! Record Codec
//!
//! The unit of storage: a key, a value, a deletion flag and a CRC-32 over
//! `key ‖ value`.
//!
//! ## Full encoding (WAL)
//! ```text
//! ┌──────────────┬─────────┬─────────┬─────┬───────────┬───────┬──────────┐
//! │ EntryLen (8) │ Del (1) │ KLen(2) │ Key │ VLen (4)  │ Value │ CRC (4)  │
//! └──────────────┴─────────┴─────────┴─────┴───────────┴───────┴──────────┘
//! ```
//!
//! ## Trailer encoding (sorted-run data file, key lives in the index)
//! ```text
//! ┌─────────┬───────────┬───────┬──────────┐
//! │ Del (1) │ VLen (4)  │ Value │ CRC (4)  │
//! └─────────┴───────────┴───────┴──────────┘
//! ```
//!
//! All integers are little-endian.

use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LsmError, RecordField, Result};

/// Maximum key length (fits the u16 length prefix)
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Maximum value length (fits the u32 length prefix)
pub const MAX_VALUE_LEN: usize = u32::MAX as usize;

/// Size of the entry length prefix
pub const ENTRY_LEN_SIZE: usize = 8;

/// Deleted flag (1) + value length (4) + checksum (4)
pub const TRAILER_FIXED_SIZE: usize = 1 + 4 + 4;

/// Entry length (8) + deleted (1) + key length (2) + value length (4) + checksum (4)
pub const RECORD_FIXED_SIZE: usize = ENTRY_LEN_SIZE + 1 + 2 + 4 + 4;

const TOMBSTONE_ON: u8 = 1;
const TOMBSTONE_OFF: u8 = 0;

/// A key-value record with its deletion marker and checksum
///
/// Ordering and equality look at the key only: two records with the same key
/// occupy the same slot, and the newer one supersedes the older.
#[derive(Debug, Clone)]
pub struct Record {
    key: Bytes,
    value: Bytes,
    deleted: bool,
    checksum: u32,
}

impl Record {
    /// Create a live record, rejecting keys/values that cannot be encoded
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        check_key(&key)?;
        check_value(&value)?;

        let checksum = compute_checksum(&key, &value);
        Ok(Self {
            key,
            value,
            deleted: false,
            checksum,
        })
    }

    /// Create a tombstone for `key` with an empty value
    pub fn tombstone(key: impl Into<Bytes>) -> Result<Self> {
        let mut record = Self::new(key, Bytes::new())?;
        record.deleted = true;
        Ok(record)
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Set or clear the tombstone flag (the checksum covers key and value only)
    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Replace the value and recompute the checksum
    pub fn update_value(&mut self, value: impl Into<Bytes>) -> Result<()> {
        let value = value.into();
        check_value(&value)?;
        self.checksum = compute_checksum(&self.key, &value);
        self.value = value;
        Ok(())
    }

    /// Recompute CRC-32 over key and value and compare with the stored one
    pub fn check_checksum(&self) -> bool {
        compute_checksum(&self.key, &self.value) == self.checksum
    }

    /// Like [`check_checksum`](Self::check_checksum), but as an error
    pub fn verify(&self) -> Result<()> {
        let computed = compute_checksum(&self.key, &self.value);
        if computed != self.checksum {
            return Err(LsmError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }

    /// Length of the full encoding in bytes
    pub fn encoded_len(&self) -> usize {
        RECORD_FIXED_SIZE + self.key.len() + self.value.len()
    }

    /// Length of the trailer encoding in bytes
    pub fn trailer_len(&self) -> usize {
        TRAILER_FIXED_SIZE + self.value.len()
    }

    // =========================================================================
    // Full encoding
    // =========================================================================

    /// Serialize the whole record, key included
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64_le(self.encoded_len() as u64);
        buf.put_u8(self.flag());
        buf.put_u16_le(self.key.len() as u16);
        buf.put_slice(&self.key);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.value);
        buf.put_u32_le(self.checksum);
        buf.freeze()
    }

    /// Deserialize one record from the front of `buf`
    ///
    /// Each field that cannot be read in full fails with its own
    /// [`LsmError::Truncated`]. The checksum is read, not verified; call
    /// [`verify`](Self::verify) for that.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        let entry_len = read_u64(buf, RecordField::EntryLength)?;
        let flag = read_u8(buf, RecordField::Deleted)?;
        let key_len = read_u16(buf, RecordField::KeyLength)? as usize;
        let key = read_bytes(buf, key_len, RecordField::Key)?;
        let value_len = read_u32(buf, RecordField::ValueLength)? as usize;
        let value = read_bytes(buf, value_len, RecordField::Value)?;
        let checksum = read_u32(buf, RecordField::Checksum)?;

        let actual_len = (RECORD_FIXED_SIZE + key_len + value_len) as u64;
        if entry_len != actual_len {
            return Err(LsmError::Corruption(format!(
                "entry_length {} does not match decoded length {}",
                entry_len, actual_len
            )));
        }

        if key.is_empty() {
            return Err(LsmError::Corruption("decoded record has an empty key".into()));
        }

        Ok(Self {
            key,
            value,
            deleted: decode_flag(flag)?,
            checksum,
        })
    }

    // =========================================================================
    // Trailer encoding
    // =========================================================================

    /// Serialize everything but the key: `deleted | value_len | value | checksum`
    pub fn encode_trailer(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.trailer_len());
        buf.put_u8(self.flag());
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.value);
        buf.put_u32_le(self.checksum);
        buf.freeze()
    }

    /// Rebuild a record from a known key and its trailer
    ///
    /// The trailer length is checked before the fixed fields are read and
    /// again once the value length is known, so a short trailer fails with
    /// [`LsmError::TrailerTooShort`] rather than reading out of bounds.
    pub fn from_parts(key: impl Into<Bytes>, trailer: &[u8]) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(LsmError::EmptyKey);
        }

        if trailer.len() < TRAILER_FIXED_SIZE {
            return Err(LsmError::TrailerTooShort {
                needed: TRAILER_FIXED_SIZE,
                available: trailer.len(),
            });
        }

        let mut buf = trailer;
        let flag = buf.get_u8();
        let value_len = buf.get_u32_le() as usize;

        let needed = TRAILER_FIXED_SIZE + value_len;
        if trailer.len() < needed {
            return Err(LsmError::TrailerTooShort {
                needed,
                available: trailer.len(),
            });
        }

        let value = Bytes::copy_from_slice(&buf[..value_len]);
        buf.advance(value_len);
        let checksum = buf.get_u32_le();

        Ok(Self {
            key,
            value,
            deleted: decode_flag(flag)?,
            checksum,
        })
    }

    fn flag(&self) -> u8 {
        if self.deleted {
            TOMBSTONE_ON
        } else {
            TOMBSTONE_OFF
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// CRC-32 over the raw key bytes followed by the raw value bytes
pub fn compute_checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(LsmError::EmptyKey);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(LsmError::KeyTooLarge {
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    Ok(())
}

fn check_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_LEN {
        return Err(LsmError::ValueTooLarge {
            len: value.len(),
            max: MAX_VALUE_LEN,
        });
    }
    Ok(())
}

fn decode_flag(flag: u8) -> Result<bool> {
    match flag {
        TOMBSTONE_OFF => Ok(false),
        TOMBSTONE_ON => Ok(true),
        other => Err(LsmError::Corruption(format!(
            "invalid deleted flag {:#04x}",
            other
        ))),
    }
}

fn read_u8(buf: &mut impl Buf, field: RecordField) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(LsmError::Truncated { field });
    }
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut impl Buf, field: RecordField) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(LsmError::Truncated { field });
    }
    Ok(buf.get_u16_le())
}

fn read_u32(buf: &mut impl Buf, field: RecordField) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(LsmError::Truncated { field });
    }
    Ok(buf.get_u32_le())
}

fn read_u64(buf: &mut impl Buf, field: RecordField) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(LsmError::Truncated { field });
    }
    Ok(buf.get_u64_le())
}

fn read_bytes(buf: &mut impl Buf, len: usize, field: RecordField) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(LsmError::Truncated { field });
    }
    Ok(buf.copy_to_bytes(len))
}
