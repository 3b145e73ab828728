//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append every mutation before it becomes visible in the MemTable
//! - CRC32 checksums (carried by each record) for corruption detection
//! - Replay on startup to rebuild the MemTable
//! - Truncation once a flushed run has been registered
//!
//! ## File Format
//! The log is a plain sequence of fully encoded records, in write order:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Record 1                                                     │
//! │ ┌──────────┬─────┬──────┬─────┬──────┬───────┬─────────┐     │
//! │ │ Len (8)  │ Del │ KLen │ Key │ VLen │ Value │ CRC (4) │     │
//! │ └──────────┴─────┴──────┴─────┴──────┴───────┴─────────┘     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record 2 ...                                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod reader;
mod recovery;
mod writer;

pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
