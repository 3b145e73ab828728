//! Tests for LevelController
//!
//! These tests verify:
//! - Run registration and newest-first lookups
//! - Size accounting against capacity
//! - Reconstruction from the files in a level directory
//! - Quarantine of incomplete and unreadable runs
//! - Run id allocation

use std::fs;
use std::path::{Path, PathBuf};

use lsmkv::record::Record;
use lsmkv::storage::{LevelController, SortedRun};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_level() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let level_dir = temp_dir.path().join("level_0");
    let corrupt_dir = temp_dir.path().join("corrupt");
    (temp_dir, level_dir, corrupt_dir)
}

fn put(key: &str, value: &str) -> Record {
    Record::new(key.to_string(), value.to_string()).unwrap()
}

/// Write a run into `level` using its own id allocator and register it
fn add_run(level: &mut LevelController, records: &[Record]) -> SortedRun {
    let (id, files) = level.next_run_files();
    let run = SortedRun::fill(id, files, records).unwrap();
    level.add_run(run.clone());
    run
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, |entries| entries.count())
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_new_level_is_empty() {
    let (_temp, level_dir, _) = setup_temp_level();

    let level = LevelController::new(0, &level_dir, 1000).unwrap();

    assert!(level_dir.is_dir());
    assert!(level.is_empty());
    assert_eq!(level.size_bytes(), 0);
    assert_eq!(level.fill_ratio(), 0.0);
    assert!(level.key_range().is_none());
    assert_eq!(level.current_name_counter(), 1);
}

#[test]
fn test_run_ids_are_unique() {
    let (_temp, level_dir, _) = setup_temp_level();
    let level = LevelController::new(2, &level_dir, 1000).unwrap();

    let (first, first_files) = level.next_run_files();
    let (second, _) = level.next_run_files();

    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(level.current_name_counter(), 3);
    assert!(first_files
        .data
        .ends_with("sst_l2_data_000001.bin"));
}

#[test]
fn test_get_newest_run_wins() {
    let (_temp, level_dir, _) = setup_temp_level();
    let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();

    add_run(&mut level, &[put("a", "old"), put("b", "old")]);
    add_run(&mut level, &[put("b", "new")]);

    assert_eq!(level.get(b"a").unwrap().unwrap().value().as_ref(), b"old");
    assert_eq!(level.get(b"b").unwrap().unwrap().value().as_ref(), b"new");
    assert!(level.get(b"c").unwrap().is_none());
}

#[test]
fn test_get_tombstone_shadows_older_run() {
    let (_temp, level_dir, _) = setup_temp_level();
    let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();

    add_run(&mut level, &[put("a", "1")]);
    add_run(&mut level, &[Record::tombstone("a").unwrap()]);

    assert!(level.get(b"a").unwrap().unwrap().is_deleted());
}

#[test]
fn test_remove_run() {
    let (_temp, level_dir, _) = setup_temp_level();
    let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();
    let run = add_run(&mut level, &[put("a", "1")]);

    let removed = level.remove_run(run.id()).unwrap();

    assert_eq!(removed.id(), run.id());
    assert!(level.is_empty());
    assert!(level.remove_run(run.id()).is_none());
    // files are left for the caller
    assert!(run.files().exist());
}

// =============================================================================
// Size Accounting Tests
// =============================================================================

#[test]
fn test_size_and_budget() {
    let (_temp, level_dir, _) = setup_temp_level();
    let mut level = LevelController::new(0, &level_dir, 100).unwrap();

    let run = add_run(&mut level, &[put("a", "1")]);
    assert_eq!(level.size_bytes(), run.size_bytes());
    assert!(!level.is_over_budget());

    let values: Vec<Record> = (0..10).map(|i| put(&format!("k{}", i), "value")).collect();
    add_run(&mut level, &values);

    assert!(level.is_over_budget());
    assert!(level.fill_ratio() > 1.0);
    assert_eq!(level.fill_ratio(), level.size_bytes() as f64 / 100.0);
}

#[test]
fn test_key_range_spans_runs() {
    let (_temp, level_dir, _) = setup_temp_level();
    let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();

    add_run(&mut level, &[put("m", "1"), put("p", "1")]);
    add_run(&mut level, &[put("c", "1"), put("f", "1")]);

    let (first, last) = level.key_range().unwrap();
    assert_eq!(first.as_ref(), b"c");
    assert_eq!(last.as_ref(), b"p");
}

// =============================================================================
// Reconstruction Tests
// =============================================================================

#[test]
fn test_open_reconstructs_runs() {
    let (_temp, level_dir, corrupt_dir) = setup_temp_level();
    {
        let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();
        add_run(&mut level, &[put("a", "1")]);
        add_run(&mut level, &[put("a", "2")]);
    }

    let level = LevelController::open(0, &level_dir, 1_000_000, &corrupt_dir).unwrap();

    assert_eq!(level.run_count(), 2);
    let ids: Vec<u64> = level.runs().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(level.get(b"a").unwrap().unwrap().value().as_ref(), b"2");
    assert_eq!(level.current_name_counter(), 3);
}

#[test]
fn test_open_quarantines_incomplete_run() {
    let (_temp, level_dir, corrupt_dir) = setup_temp_level();
    let broken = {
        let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();
        add_run(&mut level, &[put("a", "1")]);
        add_run(&mut level, &[put("b", "2")])
    };
    fs::remove_file(&broken.files().index).unwrap();

    let level = LevelController::open(0, &level_dir, 1_000_000, &corrupt_dir).unwrap();

    assert_eq!(level.run_count(), 1);
    assert!(level.get(b"b").unwrap().is_none());
    assert_eq!(file_count(&corrupt_dir), 2);
    assert!(!broken.files().data.exists());
    // the quarantined id is never reused
    assert_eq!(level.current_name_counter(), 3);
}

#[test]
fn test_open_quarantines_unreadable_run() {
    let (_temp, level_dir, corrupt_dir) = setup_temp_level();
    let broken = {
        let mut level = LevelController::new(0, &level_dir, 1_000_000).unwrap();
        add_run(&mut level, &[put("a", "1"), put("b", "2")])
    };
    let offsets = fs::read(&broken.files().offset).unwrap();
    fs::write(&broken.files().offset, &offsets[..5]).unwrap();

    let level = LevelController::open(0, &level_dir, 1_000_000, &corrupt_dir).unwrap();

    assert!(level.is_empty());
    assert_eq!(file_count(&corrupt_dir), 3);
    assert_eq!(file_count(&level_dir), 0);
}

#[test]
fn test_open_ignores_unrelated_files() {
    let (_temp, level_dir, corrupt_dir) = setup_temp_level();
    fs::create_dir_all(&level_dir).unwrap();
    fs::write(level_dir.join("notes.txt"), b"hello").unwrap();
    fs::write(level_dir.join("sst_l5_data_000001.bin"), b"wrong level").unwrap();

    let level = LevelController::open(0, &level_dir, 1_000_000, &corrupt_dir).unwrap();

    assert!(level.is_empty());
    assert!(!corrupt_dir.exists());
    assert_eq!(file_count(&level_dir), 2);
}
