//! WAL Writer
//!
//! Handles appending records to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{IoContext, Result};
use crate::record::Record;

/// Appends records to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_strategy: WalSyncStrategy,
    /// Records written since the last fsync
    unsynced: usize,
    /// Current length of the log in bytes
    len: u64,
}

impl WalWriter {
    /// Open or create a WAL file, positioned at its end
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_path(path)?;
        let len = file.metadata().with_path(path)?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            sync_strategy,
            unsynced: 0,
            len,
        })
    }

    /// Append a record and hand it to the OS before returning
    ///
    /// The record is durable once this returns under `EveryWrite`; under
    /// `EveryNEntries` it survives a process crash but may be lost on power
    /// failure until the next fsync.
    ///
    /// If the write fails, the log is cut back to its previous length so a
    /// torn record never sits in front of later appends.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let encoded = record.encode();
        let written = self
            .writer
            .write_all(&encoded)
            .and_then(|()| self.writer.flush());
        if let Err(e) = written {
            if let Err(cut) = self.cut_torn_tail() {
                tracing::error!(path = %self.path.display(), error = %cut, "failed to cut torn WAL record");
            }
            return Err(e).with_path(&self.path);
        }
        self.len += encoded.len() as u64;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush().with_path(&self.path)?;
        self.writer.get_ref().sync_data().with_path(&self.path)?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard every record in the log
    ///
    /// Only call once everything the log protects is durable elsewhere.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush().with_path(&self.path)?;
        let file = self.writer.get_ref();
        file.set_len(0).with_path(&self.path)?;
        file.sync_all().with_path(&self.path)?;
        self.len = 0;
        self.unsynced = 0;
        tracing::debug!(path = %self.path.display(), "WAL truncated");
        Ok(())
    }

    /// Truncate to the last complete record and drop anything still buffered
    fn cut_torn_tail(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_path(&self.path)?;
        file.set_len(self.len).with_path(&self.path)?;

        let stale = mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the buffer instead of flushing it
        let _ = stale.into_parts();
        Ok(())
    }

    /// Current size of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
