//! WAL Reader
//!
//! Handles reading records from the WAL file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, LsmError, Result};
use crate::record::{Record, ENTRY_LEN_SIZE, RECORD_FIXED_SIZE};

/// Reads records from the WAL file, in write order
pub struct WalReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// File length when opened; no record may extend past it
    file_len: u64,
    /// Byte offset of the next record
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let file_len = file.metadata().with_path(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            file_len,
            position: 0,
        })
    }

    /// Read the next record from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file. A partial length prefix, a
    /// declared length running past the end of the file, or a record whose
    /// checksum does not match is reported as [`LsmError::WalCorruption`].
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let offset = self.position;

        let mut len_buf = [0u8; ENTRY_LEN_SIZE];
        let read = self.read_up_to(&mut len_buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read < ENTRY_LEN_SIZE {
            return Err(corruption(offset, format!("partial length prefix ({} bytes)", read)));
        }

        let entry_len = u64::from_le_bytes(len_buf);
        if entry_len < RECORD_FIXED_SIZE as u64 {
            return Err(corruption(offset, format!("entry length {} below minimum", entry_len)));
        }

        let past_end = || {
            corruption(
                offset,
                format!("entry length {} runs past end of file", entry_len),
            )
        };
        if entry_len > self.file_len.saturating_sub(offset) {
            return Err(past_end());
        }

        let mut buf = vec![0u8; entry_len as usize];
        buf[..ENTRY_LEN_SIZE].copy_from_slice(&len_buf);
        let body = self.read_up_to(&mut buf[ENTRY_LEN_SIZE..])?;
        if body < buf.len() - ENTRY_LEN_SIZE {
            return Err(past_end());
        }

        let record = Record::decode(&mut buf.as_slice())
            .map_err(|e| corruption(offset, e.to_string()))?;
        record
            .verify()
            .map_err(|e| corruption(offset, e.to_string()))?;

        self.position += entry_len;
        Ok(Some(record))
    }

    /// Byte offset of the next unread record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all records
    pub fn records(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Fill as much of `buf` as the file allows, returning the byte count
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).with_path(&self.path),
            }
        }
        Ok(filled)
    }
}

fn corruption(offset: u64, reason: String) -> LsmError {
    LsmError::WalCorruption { offset, reason }
}

/// Iterator over WAL records; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
