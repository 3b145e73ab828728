//! Tests for LevelManager
//!
//! These tests verify:
//! - Level directories created on open
//! - MemTable flush into level 0
//! - Manual and cascading compaction
//! - Reconstruction from disk
//! - Fill ratio reporting

use lsmkv::config::Config;
use lsmkv::error::LsmError;
use lsmkv::memtable::MemTable;
use lsmkv::record::Record;
use lsmkv::storage::LevelManager;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_config() -> (TempDir, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .level_base_size(1_000_000)
        .max_levels(4)
        .build();
    (temp_dir, config)
}

fn memtable_with(pairs: &[(&str, &str)]) -> MemTable {
    let memtable = MemTable::new();
    for (key, value) in pairs {
        memtable.put(Record::new(key.to_string(), value.to_string()).unwrap());
    }
    memtable
}

fn numbered_memtable(from: usize, to: usize) -> MemTable {
    let memtable = MemTable::new();
    for i in from..to {
        memtable.put(Record::new(format!("key{:05}", i), format!("value{:05}", i)).unwrap());
    }
    memtable
}

fn lookup(manager: &LevelManager, key: &[u8]) -> Option<Record> {
    let levels = manager.read();
    for level in levels.iter() {
        if let Some(record) = level.get(key).unwrap() {
            return Some(record);
        }
    }
    None
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_level_dirs() {
    let (_temp, config) = setup_temp_config();

    let manager = LevelManager::open(&config).unwrap();

    assert_eq!(manager.level_count(), 4);
    for level in 0..4 {
        assert!(LevelManager::level_dir(&config, level).is_dir());
    }
    assert_eq!(manager.total_runs(), 0);
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_creates_level0_run() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    let memtable = memtable_with(&[("b", "2"), ("a", "1")]);

    let run = manager.flush(&memtable).unwrap().unwrap();

    assert!(memtable.is_empty());
    assert_eq!(run.record_count(), 2);
    assert_eq!(manager.run_count(0), 1);
    assert_eq!(manager.level_size(0), run.size_bytes());
    assert_eq!(lookup(&manager, b"a").unwrap().value().as_ref(), b"1");
}

#[test]
fn test_flush_empty_memtable() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();

    assert!(manager.flush(&MemTable::new()).unwrap().is_none());
    assert_eq!(manager.total_runs(), 0);
}

#[test]
fn test_flush_keeps_tombstones() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    let memtable = MemTable::new();
    memtable.delete("gone").unwrap();

    manager.flush(&memtable).unwrap();

    assert!(lookup(&manager, b"gone").unwrap().is_deleted());
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compact_level_moves_data_down() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    manager.flush(&memtable_with(&[("a", "old"), ("b", "old")])).unwrap();
    manager.flush(&memtable_with(&[("b", "new"), ("c", "new")])).unwrap();

    let stats = manager.compact_level(0).unwrap().unwrap();

    assert_eq!(stats.input_runs, 2);
    assert_eq!(stats.records_written, 3);
    assert_eq!(manager.run_count(0), 0);
    assert_eq!(manager.run_count(1), 1);
    assert_eq!(lookup(&manager, b"b").unwrap().value().as_ref(), b"new");

    // inputs are gone from disk
    let level0 = LevelManager::level_dir(&config, 0);
    assert_eq!(std::fs::read_dir(level0).unwrap().count(), 0);
}

#[test]
fn test_compact_empty_level() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();

    assert!(manager.compact_level(0).unwrap().is_none());
}

#[test]
fn test_compact_last_level_is_invalid() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();

    assert!(matches!(
        manager.compact_level(3),
        Err(LsmError::InvalidLevel(3))
    ));
}

#[test]
fn test_compact_pending_cascades() {
    let temp = TempDir::new().unwrap();
    // capacities: level 0 = 400, level 1 = 800, level 2 = 1600 bytes
    let config = Config::builder()
        .data_dir(temp.path())
        .level_base_size(200)
        .level_ratio(2)
        .max_levels(4)
        .build();
    let manager = LevelManager::open(&config).unwrap();

    manager.flush(&numbered_memtable(0, 40)).unwrap();
    let done = manager.compact_pending().unwrap();

    assert!(!done.is_empty());
    assert_eq!(manager.run_count(0), 0);
    for level in 0..3 {
        assert!(
            manager.level_size(level) <= config.level_capacity(level),
            "level {} over budget",
            level
        );
    }
    for i in 0..40 {
        let key = format!("key{:05}", i);
        assert!(lookup(&manager, key.as_bytes()).is_some(), "{} lost", key);
    }
}

#[test]
fn test_compact_pending_by_run_count() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .max_runs_per_level(2)
        .max_levels(3)
        .build();
    let manager = LevelManager::open(&config).unwrap();

    for i in 0..3 {
        manager.flush(&numbered_memtable(i * 10, i * 10 + 10)).unwrap();
    }
    assert_eq!(manager.run_count(0), 3);

    manager.compact_pending().unwrap();

    assert_eq!(manager.run_count(0), 0);
    assert_eq!(manager.run_count(1), 1);
}

// =============================================================================
// Reconstruction Tests
// =============================================================================

#[test]
fn test_reopen_sees_flushed_runs() {
    let (_temp, config) = setup_temp_config();
    {
        let manager = LevelManager::open(&config).unwrap();
        manager.flush(&memtable_with(&[("a", "1")])).unwrap();
        manager.flush(&memtable_with(&[("a", "2")])).unwrap();
        manager.compact_level(0).unwrap();
        manager.flush(&memtable_with(&[("b", "3")])).unwrap();
    }

    let manager = LevelManager::open(&config).unwrap();

    assert_eq!(manager.run_count(0), 1);
    assert_eq!(manager.run_count(1), 1);
    assert_eq!(lookup(&manager, b"a").unwrap().value().as_ref(), b"2");
    assert_eq!(lookup(&manager, b"b").unwrap().value().as_ref(), b"3");
}

#[test]
fn test_reconstruct_reloads_from_disk() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    let run = manager.flush(&memtable_with(&[("a", "1")])).unwrap().unwrap();

    // a run deleted behind the manager's back disappears after reconstruct
    run.remove_files().unwrap();
    manager.reconstruct().unwrap();

    assert_eq!(manager.total_runs(), 0);
    assert!(lookup(&manager, b"a").is_none());
}

#[test]
fn test_flush_after_reconstruct_uses_fresh_ids() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    let first = manager.flush(&memtable_with(&[("a", "1")])).unwrap().unwrap();

    manager.reconstruct().unwrap();
    let second = manager.flush(&memtable_with(&[("b", "2")])).unwrap().unwrap();

    assert!(second.id() > first.id());
    assert_eq!(manager.run_count(0), 2);
}

// =============================================================================
// Statistics Tests
// =============================================================================

#[test]
fn test_fill_ratios_sorted_descending() {
    let (_temp, config) = setup_temp_config();
    let manager = LevelManager::open(&config).unwrap();
    manager.flush(&numbered_memtable(0, 100)).unwrap();
    manager.compact_level(0).unwrap();
    manager.flush(&numbered_memtable(100, 110)).unwrap();

    let ratios = manager.fill_ratios();

    assert_eq!(ratios.len(), 4);
    for pair in ratios.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
    assert_eq!(manager.max_fill_ratio(), ratios[0].1);

    let level0 = ratios.iter().find(|(level, _)| *level == 0).unwrap().1;
    assert_eq!(
        level0,
        manager.level_size(0) as f64 / config.level_capacity(0) as f64
    );
}
