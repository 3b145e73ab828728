//! Configuration for lsmkv
//!
//! Centralized configuration with sensible defaults. Every on-disk location is
//! derived from `data_dir`; nothing is read from global path constants.

use std::path::PathBuf;

use crate::error::{LsmError, Result};

/// Main configuration for an lsmkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log                 (write-ahead log)
    ///     ├── levels/level_{L}/       (sorted runs, three files each)
    ///     └── corrupt/                (incomplete runs moved aside on startup)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Level Configuration
    // -------------------------------------------------------------------------
    /// Base size used for level capacities: `base * ratio^(level + 1)`
    pub level_base_size: u64,

    /// Growth factor between consecutive levels
    pub level_ratio: u64,

    /// Number of levels; the last one is never compacted further
    pub max_levels: usize,

    /// Compact a level once it holds more runs than this, whatever its size
    pub max_runs_per_level: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lsmkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 1_000_000,
            level_base_size: 1_000_000,
            level_ratio: 10,
            max_levels: 7,
            max_runs_per_level: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Capacity of `level` in bytes, saturating instead of overflowing
    pub fn level_capacity(&self, level: usize) -> u64 {
        let mut capacity = self.level_base_size;
        for _ in 0..=level {
            capacity = capacity.saturating_mul(self.level_ratio);
        }
        capacity
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(LsmError::Config("memtable_size_limit must be > 0".into()));
        }
        if self.level_base_size == 0 {
            return Err(LsmError::Config("level_base_size must be > 0".into()));
        }
        if self.level_ratio < 2 {
            return Err(LsmError::Config(format!(
                "level_ratio must be >= 2, got {}",
                self.level_ratio
            )));
        }
        if self.max_levels < 2 {
            return Err(LsmError::Config(format!(
                "max_levels must be >= 2, got {}",
                self.max_levels
            )));
        }
        if self.max_runs_per_level == 0 {
            return Err(LsmError::Config("max_runs_per_level must be > 0".into()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(LsmError::Config("WAL sync count must be > 0".into()));
        }
        Ok(())
    }

    /// Path of the write-ahead log
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    /// Directory holding one sub-directory per level
    pub fn levels_dir(&self) -> PathBuf {
        self.data_dir.join("levels")
    }

    /// Directory incomplete runs are moved to during reconstruction
    pub fn corrupt_dir(&self) -> PathBuf {
        self.data_dir.join("corrupt")
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the base level size (in bytes)
    pub fn level_base_size(mut self, size: u64) -> Self {
        self.config.level_base_size = size;
        self
    }

    /// Set the growth ratio between levels
    pub fn level_ratio(mut self, ratio: u64) -> Self {
        self.config.level_ratio = ratio;
        self
    }

    /// Set the number of levels
    pub fn max_levels(mut self, count: usize) -> Self {
        self.config.max_levels = count;
        self
    }

    /// Set the run count that forces a level compaction
    pub fn max_runs_per_level(mut self, count: usize) -> Self {
        self.config.max_runs_per_level = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
