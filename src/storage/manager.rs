//! Level Manager
//!
//! Owns every level and coordinates the structural changes between them.
//!
//! ## Responsibilities
//! - Rebuild all levels from disk on startup
//! - Turn a MemTable into a new level-0 run
//! - Plan and run compactions, cascading down the levels
//! - Report how full each level is

use std::fs;
use std::path::PathBuf;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::Config;
use crate::error::{IoContext, LsmError, Result};
use crate::memtable::MemTable;

use super::compaction::{self, CompactionStats};
use super::level::LevelController;
use super::sstable::SortedRun;

/// Manages the leveled storage layer
///
/// ## Concurrency:
/// - `levels`: RwLock. Lookups and scans hold the read guard for their
///   whole duration, so no run is deleted under them.
/// - `mutation_lock`: serializes flush, compaction and reconstruction.
///   Merging happens under the read guard; only the final swap of run
///   lists takes the write guard.
///
/// Lock order: `mutation_lock` → `levels` → MemTable.
pub struct LevelManager {
    config: Config,
    levels: RwLock<Vec<LevelController>>,
    mutation_lock: Mutex<()>,
}

impl LevelManager {
    /// Open or create every level under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        let levels = Self::load_levels(config)?;
        Ok(Self {
            config: config.clone(),
            levels: RwLock::new(levels),
            mutation_lock: Mutex::new(()),
        })
    }

    fn load_levels(config: &Config) -> Result<Vec<LevelController>> {
        let levels_dir = config.levels_dir();
        fs::create_dir_all(&levels_dir).with_path(&levels_dir)?;

        let mut levels = Vec::with_capacity(config.max_levels);
        for level in 0..config.max_levels {
            levels.push(LevelController::open(
                level,
                &Self::level_dir(config, level),
                config.level_capacity(level),
                &config.corrupt_dir(),
            )?);
        }

        let runs: usize = levels.iter().map(LevelController::run_count).sum();
        tracing::info!(levels = levels.len(), runs, "levels loaded");
        Ok(levels)
    }

    /// "{data_dir}/levels/level_{L}"
    pub fn level_dir(config: &Config, level: usize) -> PathBuf {
        config.levels_dir().join(format!("level_{}", level))
    }

    /// Shared access to the levels, index 0 first
    ///
    /// Hold the guard for as long as any run obtained through it is read.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<LevelController>> {
        self.levels.read()
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write the MemTable out as a new level-0 run and clear it
    ///
    /// The run is registered and the MemTable cleared under one write guard,
    /// so a reader sees the data in exactly one of the two places. The caller
    /// must keep writers out of the MemTable for the duration.
    pub fn flush(&self, memtable: &MemTable) -> Result<Option<SortedRun>> {
        let _mutation = self.mutation_lock.lock();

        let records = memtable.snapshot();
        if records.is_empty() {
            return Ok(None);
        }

        let (id, files) = self.levels.read()[0].next_run_files();
        let run = SortedRun::fill(id, files, &records)?;

        {
            let mut levels = self.levels.write();
            levels[0].add_run(run.clone());
            memtable.clear();
        }

        tracing::info!(
            id,
            records = run.record_count(),
            bytes = run.size_bytes(),
            "memtable flushed to level 0"
        );
        Ok(Some(run))
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Compact every level that needs it, top down
    ///
    /// Compacting L into L+1 can push L+1 over budget; it is checked next,
    /// so the cascade stops at the last level.
    pub fn compact_pending(&self) -> Result<Vec<CompactionStats>> {
        let _mutation = self.mutation_lock.lock();

        let mut done = Vec::new();
        for level in 0..self.config.max_levels - 1 {
            let due = compaction::needs_compaction(
                &self.levels.read()[level],
                self.config.max_runs_per_level,
            );
            if !due {
                continue;
            }
            if let Some(stats) = self.compact_locked(level)? {
                done.push(stats);
            }
        }
        Ok(done)
    }

    /// Compact `level` into `level + 1` regardless of its size
    ///
    /// Returns `None` when the level holds no runs.
    pub fn compact_level(&self, level: usize) -> Result<Option<CompactionStats>> {
        if level + 1 >= self.config.max_levels {
            return Err(LsmError::InvalidLevel(level));
        }
        let _mutation = self.mutation_lock.lock();
        self.compact_locked(level)
    }

    /// Caller holds `mutation_lock`
    fn compact_locked(&self, level: usize) -> Result<Option<CompactionStats>> {
        let (plan, output, stats) = {
            let levels = self.levels.read();
            let Some(plan) = compaction::plan(&levels, level)? else {
                return Ok(None);
            };
            let (output, stats) = compaction::execute(&plan, &levels)?;
            (plan, output, stats)
        };

        let removed = {
            let mut levels = self.levels.write();
            let mut removed = Vec::with_capacity(plan.upper.len() + plan.lower.len());
            for &id in &plan.upper {
                removed.extend(levels[level].remove_run(id));
            }
            for &id in &plan.lower {
                removed.extend(levels[level + 1].remove_run(id));
            }
            if let Some(run) = output {
                levels[level + 1].add_run(run);
            }

            // no reader can still hold these runs once the write guard is ours
            for run in &removed {
                if let Err(e) = run.remove_files() {
                    tracing::error!(level, id = run.id(), error = %e, "failed to delete compacted run");
                }
            }
            removed.len()
        };

        tracing::info!(
            from = level,
            to = level + 1,
            inputs = removed,
            written = stats.records_written,
            tombstones_dropped = stats.tombstones_dropped,
            corrupt_skipped = stats.corrupt_skipped,
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            "compaction finished"
        );
        Ok(Some(stats))
    }

    // =========================================================================
    // Reconstruction
    // =========================================================================

    /// Throw away in-memory level state and reload it from disk
    pub fn reconstruct(&self) -> Result<()> {
        let _mutation = self.mutation_lock.lock();
        let levels = Self::load_levels(&self.config)?;
        *self.levels.write() = levels;
        Ok(())
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// `(level, size / capacity)` for every level, fullest first
    pub fn fill_ratios(&self) -> Vec<(usize, f64)> {
        let mut ratios: Vec<(usize, f64)> = self
            .levels
            .read()
            .iter()
            .map(|level| (level.level(), level.fill_ratio()))
            .collect();
        ratios.sort_by(|a, b| b.1.total_cmp(&a.1));
        ratios
    }

    pub fn max_fill_ratio(&self) -> f64 {
        self.fill_ratios().first().map_or(0.0, |&(_, ratio)| ratio)
    }

    pub fn level_count(&self) -> usize {
        self.levels.read().len()
    }

    /// Number of runs in `level` (0 for a level that does not exist)
    pub fn run_count(&self, level: usize) -> usize {
        self.levels.read().get(level).map_or(0, LevelController::run_count)
    }

    pub fn total_runs(&self) -> usize {
        self.levels.read().iter().map(LevelController::run_count).sum()
    }

    /// Combined file size of `level`
    pub fn level_size(&self, level: usize) -> u64 {
        self.levels.read().get(level).map_or(0, LevelController::size_bytes)
    }
}
