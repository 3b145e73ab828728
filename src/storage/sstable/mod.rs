//! Sorted Run Module
//!
//! An immutable, key-ordered sequence of records spread over three files.
//!
//! ## File Format (all integers little-endian)
//! ```text
//! data file      [DataLen: u64][Deleted: u8][ValLen: u32][Value][CRC: u32]
//!                ... one trailer per record, in key order ...
//!
//! index file     [KeyLen: u16][Key][DataOffset: u64]
//!                ... one entry per record, in key order ...
//!
//! offset file    [IndexOffset: u64]
//!                ... one fixed-width entry per record ...
//! ```
//!
//! The offset file makes the i-th key reachable in O(1), so lookups are a
//! binary search over record positions.

mod keynator;
mod reader;
mod scanner;
mod writer;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{IoContext, Result};

pub use keynator::Keynator;
pub use reader::RunReader;
pub use scanner::{Direction, RunScanner};
pub use writer::RunWriter;

// =============================================================================
// Shared Constants (used by writer, reader, keynator, scanner)
// =============================================================================

/// Width of one offset-file entry
pub(crate) const OFFSET_ENTRY_SIZE: u64 = 8;

/// Width of the data-length prefix in the data file
pub(crate) const DATA_LEN_SIZE: u64 = 8;

/// Width of the key-length prefix in the index file
pub(crate) const KEY_LEN_SIZE: u64 = 2;

// =============================================================================
// File Naming
// =============================================================================

/// Paths of the three files backing one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    pub data: PathBuf,
    pub index: PathBuf,
    pub offset: PathBuf,
}

/// Which of the three files a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFileKind {
    Data,
    Index,
    Offset,
}

impl RunFileKind {
    fn tag(self) -> &'static str {
        match self {
            RunFileKind::Data => "data",
            RunFileKind::Index => "index",
            RunFileKind::Offset => "offset",
        }
    }
}

impl RunFiles {
    /// Files of run `id` on `level`, inside `dir`
    pub fn new(dir: &Path, level: usize, id: u64) -> Self {
        let path = |kind: RunFileKind| dir.join(file_name(level, kind, id));
        Self {
            data: path(RunFileKind::Data),
            index: path(RunFileKind::Index),
            offset: path(RunFileKind::Offset),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [self.data.as_path(), self.index.as_path(), self.offset.as_path()]
    }

    pub fn exist(&self) -> bool {
        self.all().iter().all(|p| p.is_file())
    }

    /// Delete all three files; missing ones are ignored
    pub fn remove(&self) -> Result<()> {
        for path in self.all() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_path(path),
            }
        }
        Ok(())
    }
}

/// "sst_l{level}_{kind}_{id:06}.bin"
pub fn file_name(level: usize, kind: RunFileKind, id: u64) -> String {
    format!("sst_l{}_{}_{:06}.bin", level, kind.tag(), id)
}

/// Parse "sst_l2_index_000042.bin" → Some((2, Index, 42))
pub fn parse_file_name(name: &str) -> Option<(usize, RunFileKind, u64)> {
    let rest = name.strip_prefix("sst_l")?.strip_suffix(".bin")?;
    let (level, rest) = rest.split_once('_')?;
    let (kind, id) = rest.split_once('_')?;
    let kind = match kind {
        "data" => RunFileKind::Data,
        "index" => RunFileKind::Index,
        "offset" => RunFileKind::Offset,
        _ => return None,
    };
    Some((level.parse().ok()?, kind, id.parse().ok()?))
}

// =============================================================================
// Sorted Run Metadata
// =============================================================================

/// Whether range reads return tombstones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    /// Every record, tombstones included
    All,
    /// Live records only; tombstones mark their key dead
    Alive,
}

/// Keys already known to be deleted during a multi-run range read
pub type DeadKeys = BTreeSet<Bytes>;

/// Handle to one immutable sorted run
///
/// Holds only metadata; every read opens the files it needs, so a shared
/// reference is enough to read concurrently.
#[derive(Debug, Clone)]
pub struct SortedRun {
    id: u64,
    files: RunFiles,
    first_key: Bytes,
    last_key: Bytes,
    record_count: u64,
    data_size: u64,
    index_size: u64,
    offset_size: u64,
}

impl SortedRun {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn files(&self) -> &RunFiles {
        &self.files
    }

    pub fn first_key(&self) -> &Bytes {
        &self.first_key
    }

    pub fn last_key(&self) -> &Bytes {
        &self.last_key
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Combined size of the three files
    pub fn size_bytes(&self) -> u64 {
        self.data_size + self.index_size + self.offset_size
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn index_size(&self) -> u64 {
        self.index_size
    }

    pub fn offset_size(&self) -> u64 {
        self.offset_size
    }

    /// Quick check if a key might be in this run (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        !self.is_empty() && key >= self.first_key.as_ref() && key <= self.last_key.as_ref()
    }

    /// True when `[first, last]` intersects this run's key range
    pub fn overlap(&self, first: &[u8], last: &[u8]) -> bool {
        !self.is_empty() && first <= self.last_key.as_ref() && last >= self.first_key.as_ref()
    }

    /// Delete the run's files from disk
    pub fn remove_files(&self) -> Result<()> {
        self.files.remove()
    }
}
