//! Keynator
//!
//! Forward-only cursor over the keys of one run, reading the offset file
//! sequentially. Move-only (no `Clone`): each keynator owns its file handles
//! and position.

use std::fs::File;
use std::io::BufReader;

use bytes::Bytes;

use crate::error::{IoContext, LsmError, Result};
use crate::record::Record;

use super::reader::read_next;
use super::{RunReader, SortedRun};

pub struct Keynator<'a> {
    run: &'a SortedRun,
    reader: RunReader<'a>,
    offsets: BufReader<File>,
    /// Records consumed so far
    position: u64,
    /// Key and data offset at the last position
    current: Option<(Bytes, u64)>,
}

impl<'a> Keynator<'a> {
    pub fn open(run: &'a SortedRun) -> Result<Self> {
        let path = &run.files().offset;
        let offsets = BufReader::new(File::open(path).with_path(path)?);
        Ok(Self {
            run,
            reader: RunReader::open(run)?,
            offsets,
            position: 0,
            current: None,
        })
    }

    /// Advance to the next key; `None` once the run is exhausted
    ///
    /// A corrupt index entry is still consumed: the error leaves the cursor
    /// with no current key, and the next call reads the entry after it.
    pub fn next_key(&mut self) -> Result<Option<Bytes>> {
        self.current = None;
        if self.position >= self.reader.record_count() {
            return Ok(None);
        }
        self.position += 1;

        let mut word = [0u8; 8];
        read_next(&mut self.offsets, &self.run.files().offset, &mut word, "offset entry")?;
        let (key, data_offset) = self.reader.index_entry_at(u64::from_le_bytes(word))?;

        self.current = Some((key.clone(), data_offset));
        Ok(Some(key))
    }

    /// Key at the current position, if any
    pub fn current_key(&self) -> Option<&Bytes> {
        self.current.as_ref().map(|(key, _)| key)
    }

    /// Raw trailer bytes of the record at the current position
    pub fn current_data(&mut self) -> Result<Vec<u8>> {
        let data_offset = self.current_offset()?;
        self.reader.trailer_at(data_offset)
    }

    /// Decoded, checksum-verified record at the current position
    pub fn current_record(&mut self) -> Result<Record> {
        let key = match &self.current {
            Some((key, _)) => key.clone(),
            None => return Err(exhausted()),
        };
        let trailer = self.current_data()?;
        let record = Record::from_parts(key, &trailer)?;
        record.verify()?;
        Ok(record)
    }

    fn current_offset(&self) -> Result<u64> {
        self.current
            .as_ref()
            .map(|(_, offset)| *offset)
            .ok_or_else(exhausted)
    }
}

fn exhausted() -> LsmError {
    LsmError::Corruption("keynator has no current record".into())
}
