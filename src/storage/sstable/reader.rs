//! Sorted Run Reader
//!
//! Point lookups and boundary searches by binary search over the offset
//! file, plus range reads and metadata reconstruction.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::error::{IoContext, LsmError, Result};
use crate::record::Record;

use super::{
    DeadKeys, KeyFilter, Keynator, RunFiles, SortedRun, DATA_LEN_SIZE, KEY_LEN_SIZE,
    OFFSET_ENTRY_SIZE,
};

/// Open file handles on one run, for random access by record position
pub struct RunReader<'a> {
    run: &'a SortedRun,
    data: File,
    index: File,
    offset: File,
}

impl<'a> RunReader<'a> {
    pub fn open(run: &'a SortedRun) -> Result<Self> {
        let files = &run.files;
        Ok(Self {
            run,
            data: File::open(&files.data).with_path(&files.data)?,
            index: File::open(&files.index).with_path(&files.index)?,
            offset: File::open(&files.offset).with_path(&files.offset)?,
        })
    }

    pub fn record_count(&self) -> u64 {
        self.run.record_count
    }

    /// Key and data-file offset of the record at `position`
    pub fn index_entry(&mut self, position: u64) -> Result<(Bytes, u64)> {
        if position >= self.run.record_count {
            return Err(LsmError::Corruption(format!(
                "record position {} out of range (count {})",
                position, self.run.record_count
            )));
        }

        let files = &self.run.files;
        let mut word = [0u8; 8];
        read_at(
            &mut self.offset,
            &files.offset,
            position * OFFSET_ENTRY_SIZE,
            &mut word,
            "offset entry",
        )?;
        self.index_entry_at(u64::from_le_bytes(word))
    }

    /// Key and data-file offset of the index entry starting at `index_offset`
    pub(super) fn index_entry_at(&mut self, index_offset: u64) -> Result<(Bytes, u64)> {
        let files = &self.run.files;
        let mut word = [0u8; 8];
        let mut len = [0u8; KEY_LEN_SIZE as usize];
        read_at(&mut self.index, &files.index, index_offset, &mut len, "key length")?;
        let key_len = u16::from_le_bytes(len) as usize;

        let mut key = vec![0u8; key_len];
        read_next(&mut self.index, &files.index, &mut key, "key")?;
        read_next(&mut self.index, &files.index, &mut word, "data offset")?;

        Ok((Bytes::from(key), u64::from_le_bytes(word)))
    }

    pub fn key_at(&mut self, position: u64) -> Result<Bytes> {
        Ok(self.index_entry(position)?.0)
    }

    /// Raw trailer bytes stored at `data_offset`
    pub fn trailer_at(&mut self, data_offset: u64) -> Result<Vec<u8>> {
        let path = &self.run.files.data;
        let mut word = [0u8; DATA_LEN_SIZE as usize];
        read_at(&mut self.data, path, data_offset, &mut word, "data length")?;
        let len = u64::from_le_bytes(word);

        let end = data_offset
            .checked_add(DATA_LEN_SIZE)
            .and_then(|start| start.checked_add(len));
        if end.map_or(true, |end| end > self.run.data_size) {
            return Err(LsmError::Corruption(format!(
                "data length {} at offset {} runs past end of {}",
                len,
                data_offset,
                path.display()
            )));
        }

        let mut trailer = vec![0u8; len as usize];
        read_next(&mut self.data, path, &mut trailer, "trailer")?;
        Ok(trailer)
    }

    /// Decoded, checksum-verified record at `position`
    pub fn record_at(&mut self, position: u64) -> Result<Record> {
        let (key, data_offset) = self.index_entry(position)?;
        let trailer = self.trailer_at(data_offset)?;
        let record = Record::from_parts(key, &trailer)?;
        record.verify()?;
        Ok(record)
    }

    /// Position of the first key `>= key` (record count if none)
    pub fn lower_bound(&mut self, key: &[u8]) -> Result<u64> {
        let (mut lo, mut hi) = (0, self.run.record_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)?.as_ref() < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Position of the first key `> key` (record count if none)
    pub fn upper_bound(&mut self, key: &[u8]) -> Result<u64> {
        let (mut lo, mut hi) = (0, self.run.record_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)?.as_ref() <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

impl SortedRun {
    /// Rebuild metadata from files already on disk
    ///
    /// Only the offset file size and the first and last index entries are
    /// read; the data file is never scanned.
    pub fn reconstruct(id: u64, files: RunFiles) -> Result<Self> {
        let size = |path: &Path| -> Result<u64> { Ok(fs::metadata(path).with_path(path)?.len()) };
        let data_size = size(&files.data)?;
        let index_size = size(&files.index)?;
        let offset_size = size(&files.offset)?;

        if offset_size % OFFSET_ENTRY_SIZE != 0 {
            return Err(LsmError::Corruption(format!(
                "offset file {} has size {}, not a multiple of {}",
                files.offset.display(),
                offset_size,
                OFFSET_ENTRY_SIZE
            )));
        }
        let record_count = offset_size / OFFSET_ENTRY_SIZE;
        if record_count == 0 {
            return Err(LsmError::EmptyRun(files.data));
        }

        let mut run = Self {
            id,
            files,
            first_key: Bytes::new(),
            last_key: Bytes::new(),
            record_count,
            data_size,
            index_size,
            offset_size,
        };

        let (first_key, last_key) = {
            let mut reader = RunReader::open(&run)?;
            (reader.key_at(0)?, reader.key_at(record_count - 1)?)
        };
        run.first_key = first_key;
        run.last_key = last_key;
        Ok(run)
    }

    pub fn reader(&self) -> Result<RunReader<'_>> {
        if self.is_empty() {
            return Err(LsmError::EmptyRun(self.files.data.clone()));
        }
        RunReader::open(self)
    }

    /// Point lookup; tombstones are returned, the caller decides
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if self.is_empty() {
            return Err(LsmError::EmptyRun(self.files.data.clone()));
        }
        if !self.might_contain(key) {
            return Ok(None);
        }
        let mut reader = self.reader()?;

        let position = reader.lower_bound(key)?;
        if position < self.record_count && reader.key_at(position)?.as_ref() == key {
            return reader.record_at(position).map(Some);
        }
        Ok(None)
    }

    pub fn lower_bound(&self, key: &[u8]) -> Result<u64> {
        self.reader()?.lower_bound(key)
    }

    pub fn upper_bound(&self, key: &[u8]) -> Result<u64> {
        self.reader()?.upper_bound(key)
    }

    /// Up to `count` records with key `>= key`, ascending
    pub fn larger_or_equal(
        &self,
        key: &[u8],
        count: usize,
        filter: KeyFilter,
        dead_keys: &mut DeadKeys,
    ) -> Result<Vec<Record>> {
        let mut reader = self.reader()?;
        let mut out = Vec::new();
        let mut position = reader.lower_bound(key)?;

        while position < self.record_count && out.len() < count {
            let record = reader.record_at(position)?;
            position += 1;
            if let Some(record) = apply_filter(record, filter, dead_keys) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Up to `count` records with key `<= key`, descending
    pub fn smaller_or_equal(
        &self,
        key: &[u8],
        count: usize,
        filter: KeyFilter,
        dead_keys: &mut DeadKeys,
    ) -> Result<Vec<Record>> {
        let mut reader = self.reader()?;
        let mut out = Vec::new();
        let mut position = reader.upper_bound(key)?;

        while position > 0 && out.len() < count {
            position -= 1;
            let record = reader.record_at(position)?;
            if let Some(record) = apply_filter(record, filter, dead_keys) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Every key in the run, ascending
    pub fn all_keys(&self, filter: KeyFilter) -> Result<Vec<Bytes>> {
        let mut keynator = Keynator::open(self)?;
        let mut keys = Vec::with_capacity(self.record_count as usize);
        while let Some(key) = keynator.next_key()? {
            if filter == KeyFilter::Alive && keynator.current_record()?.is_deleted() {
                continue;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Every record in the run, ascending
    pub fn all_records(&self, filter: KeyFilter) -> Result<Vec<Record>> {
        let mut keynator = Keynator::open(self)?;
        let mut records = Vec::with_capacity(self.record_count as usize);
        while keynator.next_key()?.is_some() {
            let record = keynator.current_record()?;
            if filter == KeyFilter::Alive && record.is_deleted() {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn apply_filter(record: Record, filter: KeyFilter, dead_keys: &mut DeadKeys) -> Option<Record> {
    match filter {
        KeyFilter::All => Some(record),
        KeyFilter::Alive if record.is_deleted() => {
            dead_keys.insert(record.key().clone());
            None
        }
        KeyFilter::Alive if dead_keys.contains(record.key()) => None,
        KeyFilter::Alive => Some(record),
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

pub(super) fn read_at(
    file: &mut File,
    path: &Path,
    position: u64,
    buf: &mut [u8],
    what: &str,
) -> Result<()> {
    file.seek(SeekFrom::Start(position)).with_path(path)?;
    read_next(file, path, buf, what)
}

pub(super) fn read_next(file: &mut impl Read, path: &Path, buf: &mut [u8], what: &str) -> Result<()> {
    file.read_exact(buf)
        .map_err(|e| LsmError::from_read(path, e, what))
}
