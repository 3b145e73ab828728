//! MemTable implementation
//!
//! AVL tree with RwLock for concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;
use crate::record::Record;

use super::AvlTree;

/// In-memory table for recent writes
///
/// ## Concurrency:
/// - `tree`: RwLock, many concurrent readers or one writer
/// - `size`: atomic so `should_flush` never takes the lock
pub struct MemTable {
    tree: RwLock<AvlTree>,
    /// Sum of the encoded length of every stored record
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(AvlTree::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the record stored under `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.tree.read().search(key).cloned()
    }

    /// Insert or overwrite a record; returns the new byte size
    pub fn put(&self, record: Record) -> usize {
        let added = record.encoded_len();
        let replaced = self.tree.write().insert(record);

        let removed = replaced.map_or(0, |old| old.encoded_len());
        if added >= removed {
            self.size.fetch_add(added - removed, Ordering::SeqCst) + (added - removed)
        } else {
            self.size.fetch_sub(removed - added, Ordering::SeqCst) - (removed - added)
        }
    }

    /// Insert a tombstone for `key`; returns the new byte size
    pub fn delete(&self, key: impl Into<Bytes>) -> Result<usize> {
        Ok(self.put(Record::tombstone(key)?))
    }

    /// Flag an existing record as deleted without replacing it
    pub fn mark_deleted(&self, key: &[u8]) -> bool {
        self.tree.write().mark_deleted(key)
    }

    /// Remove the record with the largest key
    pub fn pop_last(&self) -> Option<Record> {
        let popped = self.tree.write().pop_max()?;
        self.size.fetch_sub(popped.encoded_len(), Ordering::SeqCst);
        Some(popped)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    /// Check if should flush (size > limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() > size_limit
    }

    /// Every record in ascending key order (for flush)
    pub fn snapshot(&self) -> Vec<Record> {
        self.tree.read().iter().cloned().collect()
    }

    /// Records with key `>= start`, ascending
    pub fn range_from(&self, start: &[u8]) -> Vec<Record> {
        self.tree.read().iter_from(start).cloned().collect()
    }

    /// Records with key `<= end`, descending
    pub fn range_to_rev(&self, end: &[u8]) -> Vec<Record> {
        self.tree.read().iter_rev_from(end).cloned().collect()
    }

    /// Swap the contents for `records`, later records overwriting earlier ones
    ///
    /// Readers see either the old contents or the new, never a mix.
    pub fn replace_with(&self, records: impl IntoIterator<Item = Record>) {
        let mut fresh = AvlTree::new();
        for record in records {
            fresh.insert(record);
        }
        let size = fresh.iter().map(Record::encoded_len).sum();

        let mut tree = self.tree.write();
        *tree = fresh;
        self.size.store(size, Ordering::SeqCst);
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut tree = self.tree.write();
        tree.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
