//! K-way merge over sorted sources
//!
//! Produces records in key order (ascending or descending) from any number
//! of sources that are each already sorted in that order. When a key appears
//! in several sources, only the record from the highest-ranked source is
//! emitted; see [`SourceRank`].
//!
//! This is the primitive behind both compaction and pagination. Tombstones
//! are emitted like any other record; callers decide what to do with them.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use bytes::Bytes;

use crate::error::{LsmError, Result};
use crate::record::Record;

use super::sstable::{Direction, Keynator, RunScanner};

/// Precedence of a source when several hold the same key
///
/// Smaller wins: the MemTable beats every run, a shallower level beats a
/// deeper one, and inside a level the newer (higher id) run beats the older.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceRank {
    MemTable,
    Run { level: usize, newness: Reverse<u64> },
}

impl SourceRank {
    pub fn run(level: usize, id: u64) -> Self {
        SourceRank::Run {
            level,
            newness: Reverse(id),
        }
    }
}

/// A cursor the merge can read from
///
/// Sources must already sit on their first key when handed to
/// [`MergeIterator::new`].
pub trait KeySource {
    /// Key under the cursor, `None` once exhausted
    fn current_key(&self) -> Option<&Bytes>;

    /// Read the full record under the cursor
    fn read_current(&mut self) -> Result<Record>;

    /// Move to the next key in scan order
    ///
    /// A corruption error must still move the cursor past the bad entry, so
    /// that calling `advance` again reaches the entries after it.
    fn advance(&mut self) -> Result<()>;
}

impl KeySource for Keynator<'_> {
    fn current_key(&self) -> Option<&Bytes> {
        Keynator::current_key(self)
    }

    fn read_current(&mut self) -> Result<Record> {
        self.current_record()
    }

    fn advance(&mut self) -> Result<()> {
        self.next_key().map(|_| ())
    }
}

impl KeySource for RunScanner<'_> {
    fn current_key(&self) -> Option<&Bytes> {
        RunScanner::current_key(self)
    }

    fn read_current(&mut self) -> Result<Record> {
        self.current_record()?
            .ok_or_else(|| LsmError::Corruption("run scanner read past its end".into()))
    }

    fn advance(&mut self) -> Result<()> {
        RunScanner::advance(self)
    }
}

/// Records held in memory, already in scan order
pub struct MemSource {
    records: Vec<Record>,
    position: usize,
}

impl MemSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            position: 0,
        }
    }
}

impl KeySource for MemSource {
    fn current_key(&self) -> Option<&Bytes> {
        self.records.get(self.position).map(Record::key)
    }

    fn read_current(&mut self) -> Result<Record> {
        self.records
            .get(self.position)
            .cloned()
            .ok_or_else(|| LsmError::Corruption("memtable source read past its end".into()))
    }

    fn advance(&mut self) -> Result<()> {
        if self.position < self.records.len() {
            self.position += 1;
        }
        Ok(())
    }
}

/// Either kind of cursor a merged scan reads from
pub enum ScanSource<'a> {
    Mem(MemSource),
    Run(RunScanner<'a>),
}

impl KeySource for ScanSource<'_> {
    fn current_key(&self) -> Option<&Bytes> {
        match self {
            ScanSource::Mem(source) => source.current_key(),
            ScanSource::Run(source) => KeySource::current_key(source),
        }
    }

    fn read_current(&mut self) -> Result<Record> {
        match self {
            ScanSource::Mem(source) => source.read_current(),
            ScanSource::Run(source) => source.read_current(),
        }
    }

    fn advance(&mut self) -> Result<()> {
        match self {
            ScanSource::Mem(source) => source.advance(),
            ScanSource::Run(source) => KeySource::advance(source),
        }
    }
}

// =============================================================================
// Heap ordering
// =============================================================================

struct HeapEntry {
    key: Bytes,
    rank: SourceRank,
    source: usize,
    direction: Direction,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the entry that must come out first
        // compares greatest.
        let by_key = match self.direction {
            Direction::Forward => other.key.cmp(&self.key),
            Direction::Backward => self.key.cmp(&other.key),
        };
        by_key.then_with(|| other.rank.cmp(&self.rank))
    }
}

// =============================================================================
// Merge Iterator
// =============================================================================

/// Heap-based merge of ranked sources into one deduplicated stream
pub struct MergeIterator<S> {
    sources: Vec<S>,
    ranks: Vec<SourceRank>,
    heap: BinaryHeap<HeapEntry>,
    direction: Direction,
    /// Error hit while advancing past the previous key, reported next call
    pending_error: Option<LsmError>,
}

impl<S: KeySource> MergeIterator<S> {
    pub fn new(sources: Vec<(S, SourceRank)>, direction: Direction) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        let (sources, ranks): (Vec<S>, Vec<SourceRank>) = sources.into_iter().unzip();

        for (index, (source, rank)) in sources.iter().zip(&ranks).enumerate() {
            if let Some(key) = source.current_key() {
                heap.push(HeapEntry {
                    key: key.clone(),
                    rank: *rank,
                    source: index,
                    direction,
                });
            }
        }

        Self {
            sources,
            ranks,
            heap,
            direction,
            pending_error: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Key the next call to `next` will resolve, without reading it
    pub fn peek_key(&self) -> Option<&Bytes> {
        self.heap.peek().map(|entry| &entry.key)
    }

    /// Advance a source and put it back on the heap if it has more keys
    ///
    /// Corrupt entries are stepped over and the first such error returned;
    /// the source stays in the merge. Any other error drops the source.
    fn advance_source(&mut self, index: usize) -> Result<()> {
        let source = &mut self.sources[index];
        let mut corruption = None;
        loop {
            match source.advance() {
                Ok(()) => break,
                Err(e) if e.is_corruption() => {
                    corruption.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(key) = source.current_key() {
            self.heap.push(HeapEntry {
                key: key.clone(),
                rank: self.ranks[index],
                source: index,
                direction: self.direction,
            });
        }
        corruption.map_or(Ok(()), Err)
    }
}

impl<S: KeySource> Iterator for MergeIterator<S> {
    type Item = Result<Record>;

    /// Next winning record; every other source on the same key is skipped
    ///
    /// A corrupt winner comes back as an `Err` after all sources have moved
    /// past its key, so a caller may log it and keep iterating.
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_error.take() {
            return Some(Err(err));
        }

        let top = self.heap.pop()?;
        let record = self.sources[top.source].read_current();

        let mut advance_error = self.advance_source(top.source).err();
        loop {
            let source = match self.heap.peek() {
                Some(entry) if entry.key == top.key => entry.source,
                _ => break,
            };
            self.heap.pop();
            if let Err(e) = self.advance_source(source) {
                advance_error.get_or_insert(e);
            }
        }

        self.pending_error = advance_error;
        Some(record)
    }
}
