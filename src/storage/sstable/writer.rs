//! Sorted Run Writer
//!
//! Streams records, in ascending key order, into the three run files.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use bytes::Bytes;

use crate::error::{IoContext, LsmError, Result};
use crate::record::{Record, MAX_KEY_LEN};

use super::{RunFiles, SortedRun, DATA_LEN_SIZE, KEY_LEN_SIZE, OFFSET_ENTRY_SIZE};

/// Incremental writer for a sorted run
///
/// Call [`write`](Self::write) in strictly ascending key order, then
/// [`finish`](Self::finish) to sync the files and get the run handle.
pub struct RunWriter {
    id: u64,
    files: RunFiles,
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: BufWriter<File>,
    /// Current write position in each file
    data_pos: u64,
    index_pos: u64,
    offset_pos: u64,
    record_count: u64,
    first_key: Option<Bytes>,
    last_key: Option<Bytes>,
}

impl RunWriter {
    /// Create the files of a new run, truncating any leftovers
    pub fn create(id: u64, files: RunFiles) -> Result<Self> {
        let open = |path: &std::path::Path| -> Result<BufWriter<File>> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .with_path(path)?;
            Ok(BufWriter::new(file))
        };

        Ok(Self {
            id,
            data: open(&files.data)?,
            index: open(&files.index)?,
            offset: open(&files.offset)?,
            files,
            data_pos: 0,
            index_pos: 0,
            offset_pos: 0,
            record_count: 0,
            first_key: None,
            last_key: None,
        })
    }

    /// Reopen an existing run to add records after its last key
    pub fn resume(run: &SortedRun) -> Result<Self> {
        let open = |path: &std::path::Path| -> Result<BufWriter<File>> {
            let file = OpenOptions::new().append(true).open(path).with_path(path)?;
            Ok(BufWriter::new(file))
        };

        Ok(Self {
            id: run.id,
            data: open(&run.files.data)?,
            index: open(&run.files.index)?,
            offset: open(&run.files.offset)?,
            files: run.files.clone(),
            data_pos: run.data_size,
            index_pos: run.index_size,
            offset_pos: run.offset_size,
            record_count: run.record_count,
            first_key: (!run.is_empty()).then(|| run.first_key.clone()),
            last_key: (!run.is_empty()).then(|| run.last_key.clone()),
        })
    }

    /// Append one record given as its key and encoded trailer
    pub fn write(&mut self, key: &[u8], trailer: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(LsmError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(LsmError::KeyTooLarge {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        debug_assert!(
            self.last_key.as_deref().map_or(true, |last| last < key),
            "keys must be written in ascending order"
        );

        // data: [len][trailer]
        self.data
            .write_all(&(trailer.len() as u64).to_le_bytes())
            .with_path(&self.files.data)?;
        self.data.write_all(trailer).with_path(&self.files.data)?;

        // index: [key_len][key][data_offset]
        self.index
            .write_all(&(key.len() as u16).to_le_bytes())
            .with_path(&self.files.index)?;
        self.index.write_all(key).with_path(&self.files.index)?;
        self.index
            .write_all(&self.data_pos.to_le_bytes())
            .with_path(&self.files.index)?;

        // offset: [index_offset]
        self.offset
            .write_all(&self.index_pos.to_le_bytes())
            .with_path(&self.files.offset)?;

        self.data_pos += DATA_LEN_SIZE + trailer.len() as u64;
        self.index_pos += KEY_LEN_SIZE + key.len() as u64 + 8;
        self.offset_pos += OFFSET_ENTRY_SIZE;
        self.record_count += 1;

        let key = Bytes::copy_from_slice(key);
        if self.first_key.is_none() {
            self.first_key = Some(key.clone());
        }
        self.last_key = Some(key);
        Ok(())
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.write(record.key(), &record.encode_trailer())
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn files(&self) -> &RunFiles {
        &self.files
    }

    /// Flush and sync all three files, returning the finished run
    ///
    /// A writer that never received a record deletes its files and fails
    /// with [`LsmError::EmptyRun`].
    pub fn finish(mut self) -> Result<SortedRun> {
        let (Some(first_key), Some(last_key)) = (self.first_key.take(), self.last_key.take())
        else {
            let path = self.files.data.clone();
            self.abandon()?;
            return Err(LsmError::EmptyRun(path));
        };

        for (writer, path) in [
            (&mut self.data, &self.files.data),
            (&mut self.index, &self.files.index),
            (&mut self.offset, &self.files.offset),
        ] {
            writer.flush().with_path(path)?;
            writer.get_ref().sync_all().with_path(path)?;
        }

        Ok(SortedRun {
            id: self.id,
            files: self.files,
            first_key,
            last_key,
            record_count: self.record_count,
            data_size: self.data_pos,
            index_size: self.index_pos,
            offset_size: self.offset_pos,
        })
    }

    /// Drop the writer and delete whatever it wrote
    pub fn abandon(self) -> Result<()> {
        let files = self.files.clone();
        drop(self);
        files.remove()
    }
}

impl SortedRun {
    /// Write `records` (ascending, unique keys) as a brand new run
    pub fn fill(id: u64, files: RunFiles, records: &[Record]) -> Result<Self> {
        if records.is_empty() {
            return Err(LsmError::EmptyRun(files.data));
        }

        let mut writer = RunWriter::create(id, files)?;
        for record in records {
            writer.write_record(record)?;
        }
        writer.finish()
    }

    /// Extend the run with records whose keys all sort after its last key
    pub fn append(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut writer = RunWriter::resume(self)?;
        for record in records {
            writer.write_record(record)?;
        }
        *self = writer.finish()?;
        Ok(())
    }
}
