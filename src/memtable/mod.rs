//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration (both directions) for flush and pagination
//!
//! ## Data Structure Choice
//! An AVL tree of [`Record`](crate::record::Record)s wrapped in an RwLock.
//! Deletions are tombstone records, never unlinked nodes, so a delete keeps
//! shadowing older versions on disk until the next flush.

mod avl;
mod table;

pub use avl::{AvlTree, Iter, RevIter};
pub use table::MemTable;
