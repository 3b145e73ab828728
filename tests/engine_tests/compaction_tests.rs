//! Engine Compaction Tests
//!
//! These tests verify:
//! - Level 0 overfilled past its byte budget is compacted on flush
//! - Every level but the last stays within budget afterwards
//! - Every live key survives compaction; deleted keys stay deleted
//! - Manual compaction and its error cases
//! - Fill ratio reporting
//! - A corrupt index entry costs only its own record

use lsmkv::config::{Config, WalSyncStrategy};
use lsmkv::engine::Engine;
use lsmkv::error::LsmError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Level capacities: 200, 400, then an unbounded last level
fn setup_temp_engine_with_small_levels() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(1024 * 1024)
        .level_base_size(100)
        .level_ratio(2)
        .max_levels(3)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .max_levels(4)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn key(i: usize) -> String {
    format!("key{:05}", i)
}

fn value(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get_value(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8(v.to_vec()).unwrap())
}

fn assert_levels_within_budget(engine: &Engine) {
    let config = engine.config();
    for level in 0..config.max_levels - 1 {
        assert!(
            engine.level_size(level) <= config.level_capacity(level),
            "level {} holds {} bytes, capacity {}",
            level,
            engine.level_size(level),
            config.level_capacity(level)
        );
    }
}

// =============================================================================
// Size-Triggered Compaction Tests
// =============================================================================

#[test]
fn test_overfilled_level0_is_compacted() {
    let (_temp, engine) = setup_temp_engine_with_small_levels();

    for batch in 0..8 {
        for i in batch * 5..batch * 5 + 5 {
            engine.set(key(i), format!("value{}", i)).unwrap();
        }
        engine.flush_mem_table().unwrap();
        assert_levels_within_budget(&engine);
    }

    assert_eq!(engine.run_count(0), 0);
    assert!(engine.run_count(2) > 0);
    for i in 0..40 {
        assert_eq!(value(&engine, &key(i)), Some(format!("value{}", i)));
    }
}

#[test]
fn test_compaction_keeps_newest_values() {
    let (_temp, engine) = setup_temp_engine_with_small_levels();

    for round in 0..4 {
        for i in 0..10 {
            engine.set(key(i), format!("round{}", round)).unwrap();
        }
        engine.flush_mem_table().unwrap();
    }

    for i in 0..10 {
        assert_eq!(value(&engine, &key(i)), Some("round3".into()));
    }
}

#[test]
fn test_deleted_keys_stay_deleted_through_compaction() {
    let (_temp, engine) = setup_temp_engine_with_small_levels();

    for i in 0..30 {
        engine.set(key(i), "live").unwrap();
    }
    engine.flush_mem_table().unwrap();
    for i in (0..30).step_by(2) {
        engine.remove(key(i)).unwrap();
    }
    engine.flush_mem_table().unwrap();
    for i in 30..60 {
        engine.set(key(i), "live").unwrap();
    }
    engine.flush_mem_table().unwrap();

    for i in 0..60 {
        let expected = (i >= 30 || i % 2 == 1).then(|| "live".to_string());
        assert_eq!(value(&engine, &key(i)), expected, "{}", key(i));
    }
    assert_levels_within_budget(&engine);
}

#[test]
fn test_run_count_triggers_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .max_runs_per_level(3)
        .build();
    let engine = Engine::open(config).unwrap();

    for i in 0..4 {
        engine.set(key(i), "v").unwrap();
        engine.flush_mem_table().unwrap();
    }

    assert!(engine.run_count(0) <= 3);
    assert_eq!(engine.run_count(1), 1);
}

// =============================================================================
// Manual Compaction Tests
// =============================================================================

#[test]
fn test_compact_level_manual() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.flush_mem_table().unwrap();
    engine.set("b", "2").unwrap();
    engine.flush_mem_table().unwrap();
    assert_eq!(engine.run_count(0), 2);

    assert!(engine.compact_level(0).unwrap());

    assert_eq!(engine.run_count(0), 0);
    assert_eq!(engine.run_count(1), 1);
    assert_eq!(value(&engine, "a"), Some("1".into()));
    assert_eq!(value(&engine, "b"), Some("2".into()));
}

#[test]
fn test_compact_empty_level_returns_false() {
    let (_temp, engine) = setup_temp_engine();
    assert!(!engine.compact_level(0).unwrap());
}

#[test]
fn test_compact_last_level_fails() {
    let (_temp, engine) = setup_temp_engine();
    assert!(matches!(
        engine.compact_level(3),
        Err(LsmError::InvalidLevel(3))
    ));
    assert!(engine.compact_level(10).is_err());
}

#[test]
fn test_tombstones_dropped_at_bottom() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.set("b", "2").unwrap();
    engine.flush_mem_table().unwrap();
    engine.remove("a").unwrap();
    engine.flush_mem_table().unwrap();

    // nothing below level 1, so the tombstone and the value it hides both go
    engine.compact_level(0).unwrap();

    assert!(engine.get(b"a").unwrap().is_none());
    assert_eq!(value(&engine, "b"), Some("2".into()));
}

#[test]
fn test_tombstones_kept_above_deeper_data() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.flush_mem_table().unwrap();
    engine.compact_level(0).unwrap();
    engine.compact_level(1).unwrap();
    assert_eq!(engine.run_count(2), 1);

    engine.remove("a").unwrap();
    engine.flush_mem_table().unwrap();
    engine.compact_level(0).unwrap();

    // the tombstone must survive in level 1 to hide level 2's value
    assert!(engine.get(b"a").unwrap().unwrap().is_deleted());
    assert_eq!(value(&engine, "a"), None);
}

// =============================================================================
// Fill Ratio Tests
// =============================================================================

#[test]
fn test_fill_ratios() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.get_max_fill_ratio(), 0.0);

    engine.set("a", "1").unwrap();
    engine.flush_mem_table().unwrap();

    let ratios = engine.get_fill_ratios();
    assert_eq!(ratios.len(), 4);
    assert_eq!(ratios[0].0, 0);
    assert!(ratios[0].1 > 0.0);
    assert_eq!(engine.get_max_fill_ratio(), ratios[0].1);
    for pair in ratios.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_compaction_keeps_records_after_corrupt_index_entry() {
    let (temp, engine) = setup_temp_engine();
    for (key, value) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
        engine.set(key, value).unwrap();
    }
    engine.flush_mem_table().unwrap();

    // second index entry is "b": [klen 2][key 1][offset 8] after "a"'s 11 bytes
    let index_path = temp
        .path()
        .join("levels")
        .join("level_0")
        .join("sst_l0_index_000001.bin");
    let mut index = std::fs::read(&index_path).unwrap();
    index[11..13].copy_from_slice(&u16::MAX.to_le_bytes());
    std::fs::write(&index_path, &index).unwrap();

    assert!(engine.compact_level(0).unwrap());

    assert_eq!(engine.run_count(0), 0);
    assert_eq!(value(&engine, "a"), Some("1".into()));
    assert_eq!(value(&engine, "b"), None);
    for (key, expected) in [("c", "3"), ("d", "4"), ("e", "5")] {
        assert_eq!(value(&engine, key), Some(expected.into()));
    }
}
