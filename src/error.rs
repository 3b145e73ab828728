//! Error types for lsmkv
//!
//! Provides a unified error type for all operations. Variants fall into four
//! groups: I/O failures, corruption, capacity violations and logical misuse.
//! Callers that need to tell "the disk failed" apart from "the bytes are bad"
//! should use [`LsmError::is_corruption`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using LsmError
pub type Result<T> = std::result::Result<T, LsmError>;

/// Fields of an encoded record, named in decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    EntryLength,
    Deleted,
    KeyLength,
    Key,
    ValueLength,
    Value,
    Checksum,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordField::EntryLength => "entry_length",
            RecordField::Deleted => "deleted flag",
            RecordField::KeyLength => "key_length",
            RecordField::Key => "key",
            RecordField::ValueLength => "value_length",
            RecordField::Value => "value",
            RecordField::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

/// Unified error type for lsmkv operations
#[derive(Debug, Error)]
pub enum LsmError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Failed to read {field}: unexpected end of input")]
    Truncated { field: RecordField },

    #[error("Record trailer too short: need {needed} bytes, got {available}")]
    TrailerTooShort { needed: usize, available: usize },

    #[error("WAL corruption at offset {offset}: {reason}")]
    WalCorruption { offset: u64, reason: String },

    #[error("Data corruption: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Key too large: {len} bytes (max {max})")]
    KeyTooLarge { len: usize, max: usize },

    #[error("Value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },

    // -------------------------------------------------------------------------
    // Logical Errors
    // -------------------------------------------------------------------------
    #[error("Sorted run {} holds no records", .0.display())]
    EmptyRun(PathBuf),

    #[error("Level {0} does not exist")]
    InvalidLevel(usize),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LsmError {
    /// True when the error means stored bytes are bad rather than unreachable
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LsmError::ChecksumMismatch { .. }
                | LsmError::Truncated { .. }
                | LsmError::TrailerTooShort { .. }
                | LsmError::WalCorruption { .. }
                | LsmError::Corruption(_)
        )
    }

    /// Wrap a short read on a file as corruption, keep every other I/O error
    pub(crate) fn from_read(path: &Path, err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            LsmError::Corruption(format!(
                "unexpected EOF reading {} in {}",
                what,
                path.display()
            ))
        } else {
            LsmError::File {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }
}

/// Attach the offending file path to an I/O result
pub(crate) trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| LsmError::File {
            path: path.to_path_buf(),
            source,
        })
    }
}
