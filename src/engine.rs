//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and the leveled storage
//! - Handle concurrent read/write access
//! - Trigger flushes when the MemTable is full, and compactions after them
//! - Replay the WAL on startup
//! - Ordered pagination over the merged key space

use std::fs;
use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{IoContext, Result};
use crate::memtable::MemTable;
use crate::record::{check_key, Record};
use crate::storage::{
    Direction, KeySource, LevelController, LevelManager, MemSource, MergeIterator, RunScanner,
    ScanSource, SourceRank,
};
use crate::wal::{WalRecovery, WalWriter};

/// One page of an ordered scan
///
/// `next` is the continuation token to pass back for the following page, or
/// `None` once the scan is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/remove/flush): serialized by `write_lock`
///   - The WAL append completes before the MemTable insert, so a write is
///     never visible before it is logged
///   - Flush and compaction are further serialized inside the level manager
///
/// - **Reads** (get/pagination): concurrent with each other
///   - Take the level read guard first, then the MemTable read lock
///   - A flush swaps MemTable contents into level 0 under the level write
///     guard, so a read sees each record exactly once
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Leveled on-disk storage (internal RwLock on the level list)
    levels: LevelManager,

    /// Serializes write operations (set/remove/flush)
    write_lock: Mutex<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Rebuild every level from the files on disk
    /// 3. Replay the WAL into a fresh MemTable (corruption fails the open)
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir).with_path(&config.data_dir)?;

        let levels = LevelManager::open(&config)?;

        let memtable = MemTable::new();
        let wal_path = config.wal_path();
        WalRecovery::recover_into(&wal_path, &memtable)?;
        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            memtable_entries = memtable.entry_count(),
            runs = levels.total_runs(),
            "engine opened"
        );

        Ok(Self {
            config,
            wal: Mutex::new(wal),
            memtable,
            levels,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Get the newest record for `key`
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Levels 0..N, newest run first inside each level
    ///
    /// A tombstone is returned as-is; check [`Record::is_deleted`].
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        check_key(key)?;
        let levels = self.levels.read();

        if let Some(record) = self.memtable.get(key) {
            return Ok(Some(record));
        }
        for level in levels.iter() {
            if let Some(record) = level.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Get the live value for `key`; deleted and missing keys give `None`
    pub fn get_value(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self
            .get(key)?
            .filter(|record| !record.is_deleted())
            .map(|record| record.value().clone()))
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Flush if the MemTable outgrew its limit
    ///
    /// An error means the write was not applied. A failed flush in step 4
    /// is logged and leaves the write in the WAL and MemTable.
    pub fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        self.write(Record::new(key, value)?)
    }

    /// Delete a key by writing a tombstone, with the same contract as `set`
    pub fn remove(&self, key: impl Into<Bytes>) -> Result<()> {
        self.write(Record::tombstone(key)?)
    }

    fn write(&self, record: Record) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        self.wal.lock().append(&record)?;
        self.memtable.put(record);

        if self.memtable.should_flush(self.config.memtable_size_limit) {
            if let Err(e) = self.flush_internal() {
                tracing::error!(error = %e, "flush after write failed, data kept in memtable");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Flush & Compaction
    // =========================================================================

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush_mem_table(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        // Step 1: new level-0 run, registered as the MemTable is cleared
        if self.levels.flush(&self.memtable)?.is_none() {
            return Ok(());
        }

        // Step 2: the run is registered, the log is no longer needed
        self.wal.lock().truncate()?;

        // Step 3: cascade compactions while levels are over budget
        self.levels.compact_pending()?;
        Ok(())
    }

    /// Compact level `index` into the next one
    ///
    /// Returns false when the level held nothing to compact.
    pub fn compact_level(&self, index: usize) -> Result<bool> {
        Ok(self.levels.compact_level(index)?.is_some())
    }

    /// Reload level metadata from disk and replay the WAL into the MemTable
    ///
    /// The WAL is read in full before anything is replaced; a corrupt log
    /// fails the call with the MemTable untouched.
    pub fn reconstruct_tree(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        let (records, result) = WalRecovery::recover(&self.config.wal_path())?;
        self.levels.reconstruct()?;
        self.memtable.replace_with(records);

        tracing::info!(
            entries = result.entries_recovered,
            runs = self.levels.total_runs(),
            "tree reconstructed"
        );
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> Result<()> {
        if !self.memtable.is_empty() {
            self.flush_mem_table()?;
        }
        self.wal.lock().sync()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Up to `count` live records with key `>= key`, ascending
    ///
    /// `next` is the first key not returned; passing it back as `key`
    /// continues exactly where this page stopped.
    pub fn get_ff(&self, key: &[u8], count: usize) -> Result<Page<Record, Bytes>> {
        let levels = self.levels.read();
        let mut merge = self.merged_scan(&levels, key, Direction::Forward)?;
        let (items, next) = take_page(&mut merge, count, |_| true)?;
        Ok(Page { items, next })
    }

    /// Up to `count` live records with key `<= key`, descending
    ///
    /// `next` is the next smaller key not returned.
    pub fn get_fb(&self, key: &[u8], count: usize) -> Result<Page<Record, Bytes>> {
        let levels = self.levels.read();
        let mut merge = self.merged_scan(&levels, key, Direction::Backward)?;
        let (items, next) = take_page(&mut merge, count, |_| true)?;
        Ok(Page { items, next })
    }

    /// Up to `count` live keys after skipping the first `skip`
    ///
    /// `next` is the skip value for the following page.
    pub fn get_keys(&self, count: usize, skip: usize) -> Result<Page<Bytes, usize>> {
        self.get_keys_prefix(b"", count, skip)
    }

    /// Like [`get_keys`](Self::get_keys), restricted to keys starting with `prefix`
    pub fn get_keys_prefix(
        &self,
        prefix: &[u8],
        count: usize,
        skip: usize,
    ) -> Result<Page<Bytes, usize>> {
        let levels = self.levels.read();
        let mut merge = self.merged_scan(&levels, prefix, Direction::Forward)?;
        let in_prefix = |key: &[u8]| key.starts_with(prefix);

        for _ in 0..skip {
            match next_alive(&mut merge)? {
                Some(record) if in_prefix(&record.key()[..]) => {}
                _ => {
                    return Ok(Page {
                        items: Vec::new(),
                        next: None,
                    })
                }
            }
        }

        let (records, next) = take_page(&mut merge, count, in_prefix)?;
        let items: Vec<Bytes> = records.into_iter().map(|r| r.key().clone()).collect();
        let next = next.map(|_| skip + items.len());
        Ok(Page { items, next })
    }

    /// Up to `count` live keys `>= cursor` (from the start when `None`)
    ///
    /// `next` is the cursor for the following page.
    pub fn get_keys_cursor(&self, cursor: Option<&[u8]>, count: usize) -> Result<Page<Bytes, Bytes>> {
        self.get_keys_cursor_prefix(b"", cursor, count)
    }

    /// Like [`get_keys_cursor`](Self::get_keys_cursor), restricted to `prefix`
    pub fn get_keys_cursor_prefix(
        &self,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        count: usize,
    ) -> Result<Page<Bytes, Bytes>> {
        let start = match cursor {
            Some(cursor) if cursor > prefix => cursor,
            _ => prefix,
        };

        let levels = self.levels.read();
        let mut merge = self.merged_scan(&levels, start, Direction::Forward)?;
        let (records, next) = take_page(&mut merge, count, |key| key.starts_with(prefix))?;
        Ok(Page {
            items: records.into_iter().map(|r| r.key().clone()).collect(),
            next,
        })
    }

    /// One merged cursor over the MemTable and every run, starting at `start`
    ///
    /// `levels` must be the read guard taken before the MemTable is read.
    fn merged_scan<'g>(
        &self,
        levels: &'g [LevelController],
        start: &[u8],
        direction: Direction,
    ) -> Result<MergeIterator<ScanSource<'g>>> {
        let mem = match direction {
            Direction::Forward => self.memtable.range_from(start),
            Direction::Backward => self.memtable.range_to_rev(start),
        };

        let mut sources = vec![(ScanSource::Mem(MemSource::new(mem)), SourceRank::MemTable)];
        for level in levels {
            for run in level.runs() {
                let beyond = match direction {
                    Direction::Forward => run.last_key().as_ref() < start,
                    Direction::Backward => run.first_key().as_ref() > start,
                };
                if beyond {
                    continue;
                }
                let scanner = RunScanner::seek(run, start, direction)?;
                sources.push((
                    ScanSource::Run(scanner),
                    SourceRank::run(level.level(), run.id()),
                ));
            }
        }
        Ok(MergeIterator::new(sources, direction))
    }

    // =========================================================================
    // Statistics & Accessors
    // =========================================================================

    /// `(level, fill ratio)` pairs, fullest level first
    pub fn get_fill_ratios(&self) -> Vec<(usize, f64)> {
        self.levels.fill_ratios()
    }

    pub fn get_max_fill_ratio(&self) -> f64 {
        self.levels.max_fill_ratio()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Current WAL size in bytes
    pub fn wal_size(&self) -> u64 {
        self.wal.lock().len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.level_count()
    }

    /// Number of runs in `level`
    pub fn run_count(&self, level: usize) -> usize {
        self.levels.run_count(level)
    }

    /// Combined file size of `level`
    pub fn level_size(&self, level: usize) -> u64 {
        self.levels.level_size(level)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// =============================================================================
// Scan Helpers
// =============================================================================

/// Next live record, skipping tombstones and corrupt records
fn next_alive<S: KeySource>(merge: &mut MergeIterator<S>) -> Result<Option<Record>> {
    for item in merge.by_ref() {
        match item {
            Ok(record) if record.is_deleted() => continue,
            Ok(record) => return Ok(Some(record)),
            Err(e) if e.is_corruption() => {
                tracing::warn!(error = %e, "skipping corrupt record during scan");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Collect up to `count` live records while `in_range` holds, plus the key
/// of the first live record left out
fn take_page<S: KeySource>(
    merge: &mut MergeIterator<S>,
    count: usize,
    in_range: impl Fn(&[u8]) -> bool,
) -> Result<(Vec<Record>, Option<Bytes>)> {
    let mut items = Vec::new();
    while items.len() < count {
        match next_alive(merge)? {
            Some(record) if in_range(&record.key()[..]) => items.push(record),
            _ => return Ok((items, None)),
        }
    }

    let next = next_alive(merge)?
        .filter(|record| in_range(&record.key()[..]))
        .map(|record| record.key().clone());
    Ok((items, next))
}
