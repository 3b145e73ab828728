//! Tests for Keynator
//!
//! These tests verify:
//! - Sequential key iteration in ascending order
//! - Reading the record and raw trailer at the current key
//! - Behavior before the first key and after the last

use std::path::Path;

use lsmkv::record::Record;
use lsmkv::storage::{Keynator, RunFiles, SortedRun};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn build_run(dir: &Path, records: &[Record]) -> SortedRun {
    SortedRun::fill(1, RunFiles::new(dir, 0, 1), records).unwrap()
}

fn numbered(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(format!("key{:03}", i), format!("value{}", i)).unwrap())
        .collect()
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_visits_every_key_in_order() {
    let temp = TempDir::new().unwrap();
    let records = numbered(50);
    let run = build_run(temp.path(), &records);

    let mut keynator = Keynator::open(&run).unwrap();
    let mut seen = Vec::new();
    while let Some(key) = keynator.next_key().unwrap() {
        seen.push(key);
    }

    let expected: Vec<_> = records.iter().map(|r| r.key().clone()).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_no_current_key_before_first_advance() {
    let temp = TempDir::new().unwrap();
    let run = build_run(temp.path(), &numbered(3));

    let mut keynator = Keynator::open(&run).unwrap();

    assert!(keynator.current_key().is_none());
    assert!(keynator.current_record().is_err());
}

#[test]
fn test_exhausted_stays_exhausted() {
    let temp = TempDir::new().unwrap();
    let run = build_run(temp.path(), &numbered(2));

    let mut keynator = Keynator::open(&run).unwrap();
    keynator.next_key().unwrap();
    keynator.next_key().unwrap();

    assert!(keynator.next_key().unwrap().is_none());
    assert!(keynator.current_key().is_none());
    assert!(keynator.next_key().unwrap().is_none());
}

// =============================================================================
// Current Record Tests
// =============================================================================

#[test]
fn test_current_record_matches_written() {
    let temp = TempDir::new().unwrap();
    let records = numbered(10);
    let run = build_run(temp.path(), &records);

    let mut keynator = Keynator::open(&run).unwrap();
    for expected in &records {
        let key = keynator.next_key().unwrap().unwrap();
        assert_eq!(&key, expected.key());
        assert_eq!(keynator.current_key(), Some(expected.key()));

        let record = keynator.current_record().unwrap();
        assert_eq!(record.value(), expected.value());
        assert_eq!(record.checksum(), expected.checksum());
    }
}

#[test]
fn test_current_data_is_raw_trailer() {
    let temp = TempDir::new().unwrap();
    let records = vec![
        Record::new("a", "alpha").unwrap(),
        Record::tombstone("b").unwrap(),
    ];
    let run = build_run(temp.path(), &records);

    let mut keynator = Keynator::open(&run).unwrap();
    for record in &records {
        keynator.next_key().unwrap();
        assert_eq!(
            keynator.current_data().unwrap(),
            record.encode_trailer().to_vec()
        );
    }
}

#[test]
fn test_current_record_is_repeatable() {
    let temp = TempDir::new().unwrap();
    let run = build_run(temp.path(), &numbered(3));

    let mut keynator = Keynator::open(&run).unwrap();
    keynator.next_key().unwrap();

    let first = keynator.current_record().unwrap();
    let second = keynator.current_record().unwrap();
    assert_eq!(first.value(), second.value());
}
