//! Level Controller
//!
//! Owns the sorted runs of one level, in the order they were added (oldest
//! first). A later run shadows an earlier one for the same key.
//!
//! ## Responsibilities
//! - Discover existing runs on startup, quarantining incomplete ones
//! - Point lookups newest → oldest
//! - Byte-size accounting against the level's capacity
//! - Unique run ids for new files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::{IoContext, LsmError, Result};
use crate::record::Record;

use super::sstable::{parse_file_name, RunFileKind, RunFiles, SortedRun};

/// Manages the runs of a single level
///
/// ## Concurrency:
/// - Lives inside the level manager's RwLock; mutation needs the write guard
/// - `next_run_id`: atomic, so ids can be handed out under a read guard
pub struct LevelController {
    level: usize,
    dir: PathBuf,
    /// Oldest first
    runs: Vec<SortedRun>,
    capacity: u64,
    next_run_id: AtomicU64,
}

impl LevelController {
    /// Create an empty level in `dir`
    pub fn new(level: usize, dir: &Path, capacity: u64) -> Result<Self> {
        fs::create_dir_all(dir).with_path(dir)?;
        Ok(Self {
            level,
            dir: dir.to_path_buf(),
            runs: Vec::new(),
            capacity,
            next_run_id: AtomicU64::new(1),
        })
    }

    /// Open a level, rebuilding run metadata from the files in `dir`
    ///
    /// On startup:
    /// 1. Group files by run id
    /// 2. Reconstruct every complete triple (no data scan)
    /// 3. Move incomplete or unreadable runs into `corrupt_dir`
    /// 4. Continue ids after the highest one seen
    pub fn open(level: usize, dir: &Path, capacity: u64, corrupt_dir: &Path) -> Result<Self> {
        let mut controller = Self::new(level, dir, capacity)?;

        let mut found: BTreeMap<u64, [bool; 3]> = BTreeMap::new();
        for entry in fs::read_dir(dir).with_path(dir)? {
            let entry = entry.with_path(dir)?;
            let name = entry.file_name();
            let Some((file_level, kind, id)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            if file_level != level {
                tracing::warn!(
                    file = %entry.path().display(),
                    level,
                    "run file belongs to another level, ignoring"
                );
                continue;
            }
            let slot = match kind {
                RunFileKind::Data => 0,
                RunFileKind::Index => 1,
                RunFileKind::Offset => 2,
            };
            found.entry(id).or_default()[slot] = true;
        }

        for (&id, present) in &found {
            let files = RunFiles::new(dir, level, id);
            if present.iter().any(|p| !p) {
                tracing::warn!(level, id, ?present, "incomplete run, moving to corrupt dir");
                quarantine(&files, corrupt_dir)?;
                continue;
            }

            match SortedRun::reconstruct(id, files.clone()) {
                Ok(run) => controller.runs.push(run),
                Err(e) if e.is_corruption() || matches!(e, LsmError::EmptyRun(_)) => {
                    tracing::warn!(level, id, error = %e, "unreadable run, moving to corrupt dir");
                    quarantine(&files, corrupt_dir)?;
                }
                Err(e) => return Err(e),
            }
        }

        let next_id = found.keys().next_back().map_or(1, |&id| id + 1);
        controller.next_run_id.store(next_id, Ordering::SeqCst);

        tracing::debug!(
            level,
            runs = controller.runs.len(),
            bytes = controller.size_bytes(),
            next_id,
            "level reconstructed"
        );
        Ok(controller)
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Runs, oldest first
    pub fn runs(&self) -> &[SortedRun] {
        &self.runs
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Register a run as the newest in this level
    pub fn add_run(&mut self, run: SortedRun) {
        self.runs.push(run);
    }

    /// Unregister a run; its files are left alone
    pub fn remove_run(&mut self, id: u64) -> Option<SortedRun> {
        let position = self.runs.iter().position(|run| run.id() == id)?;
        Some(self.runs.remove(position))
    }

    /// Look `key` up newest → oldest; the first hit wins, tombstones included
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        for run in self.runs.iter().rev() {
            if !run.might_contain(key) {
                continue;
            }
            if let Some(record) = run.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Combined size of every file of every run
    pub fn size_bytes(&self) -> u64 {
        self.runs.iter().map(SortedRun::size_bytes).sum()
    }

    pub fn is_over_budget(&self) -> bool {
        self.size_bytes() > self.capacity
    }

    /// size / capacity
    pub fn fill_ratio(&self) -> f64 {
        self.size_bytes() as f64 / self.capacity as f64
    }

    /// Smallest first key and largest last key across all runs
    pub fn key_range(&self) -> Option<(Bytes, Bytes)> {
        let first = self.runs.iter().map(|run| run.first_key()).min()?;
        let last = self.runs.iter().map(|run| run.last_key()).max()?;
        Some((first.clone(), last.clone()))
    }

    /// Allocate a fresh id and the file paths for a new run
    pub fn next_run_files(&self) -> (u64, RunFiles) {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        (id, RunFiles::new(&self.dir, self.level, id))
    }

    /// The id the next run will get
    pub fn current_name_counter(&self) -> u64 {
        self.next_run_id.load(Ordering::SeqCst)
    }
}

/// Move whichever of a run's files exist into `corrupt_dir`
fn quarantine(files: &RunFiles, corrupt_dir: &Path) -> Result<()> {
    fs::create_dir_all(corrupt_dir).with_path(corrupt_dir)?;
    for path in files.all() {
        if !path.exists() {
            continue;
        }
        if let Some(name) = path.file_name() {
            let target = corrupt_dir.join(name);
            fs::rename(path, &target).with_path(path)?;
        }
    }
    Ok(())
}
