//! Run Scanner
//!
//! Positional cursor over a run that walks forward or backward from a
//! boundary found by binary search. Pagination merges one scanner per run.

use bytes::Bytes;

use crate::error::Result;
use crate::record::Record;

use super::{RunReader, SortedRun};

/// Order in which a scan visits keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending keys
    Forward,
    /// Descending keys
    Backward,
}

pub struct RunScanner<'a> {
    reader: RunReader<'a>,
    direction: Direction,
    /// Position of the current record; None once exhausted
    position: Option<u64>,
    current_key: Option<Bytes>,
}

impl<'a> RunScanner<'a> {
    /// Position at the first key `>= start` (forward) or last key `<= start` (backward)
    pub fn seek(run: &'a SortedRun, start: &[u8], direction: Direction) -> Result<Self> {
        let mut reader = run.reader()?;
        let position = match direction {
            Direction::Forward => {
                let lower = reader.lower_bound(start)?;
                (lower < run.record_count()).then_some(lower)
            }
            Direction::Backward => reader.upper_bound(start)?.checked_sub(1),
        };
        Self::at(reader, position, direction)
    }

    /// Position at the first record in scan order
    pub fn from_start(run: &'a SortedRun, direction: Direction) -> Result<Self> {
        let reader = run.reader()?;
        let position = match direction {
            Direction::Forward => Some(0),
            Direction::Backward => run.record_count().checked_sub(1),
        };
        Self::at(reader, position, direction)
    }

    fn at(reader: RunReader<'a>, position: Option<u64>, direction: Direction) -> Result<Self> {
        let mut scanner = Self {
            reader,
            direction,
            position,
            current_key: None,
        };
        scanner.load_key()?;
        Ok(scanner)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn current_key(&self) -> Option<&Bytes> {
        self.current_key.as_ref()
    }

    /// Decoded, checksum-verified record under the cursor
    pub fn current_record(&mut self) -> Result<Option<Record>> {
        match self.position {
            Some(position) => self.reader.record_at(position).map(Some),
            None => Ok(None),
        }
    }

    /// Step one record in the scan direction
    pub fn advance(&mut self) -> Result<()> {
        let count = self.reader.record_count();
        self.position = match (self.position, self.direction) {
            (None, _) => None,
            (Some(p), Direction::Forward) => (p + 1 < count).then_some(p + 1),
            (Some(p), Direction::Backward) => p.checked_sub(1),
        };
        self.load_key()
    }

    /// On error the cursor keeps its new position with no current key
    fn load_key(&mut self) -> Result<()> {
        self.current_key = None;
        if let Some(position) = self.position {
            self.current_key = Some(self.reader.key_at(position)?);
        }
        Ok(())
    }
}
