//! # lsmkv
//!
//! An embedded log-structured merge (LSM) key-value storage engine with:
//! - Write-Ahead Logging (WAL) for durability
//! - An AVL-tree MemTable buffering recent writes
//! - Immutable sorted runs with a binary-searchable offset index
//! - Size-tiered levels merged by k-way compaction
//! - Cursor pagination over the merged key space
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │            (Single Writer / Multi Reader)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │ ───────▶ │  MemTable   │
//!   │  (Append)   │  then    │ (AVL tree)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ flush
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Level 0   │
//!                           └──────┬──────┘
//!                                  │ compaction (k-way merge)
//!                                  ▼
//!                           ┌─────────────┐
//!                           │  Level 1..N │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod record;

pub mod engine;
pub mod memtable;
pub mod storage;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, Page};
pub use error::{LsmError, Result};
pub use record::Record;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lsmkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
