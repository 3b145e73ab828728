//! Storage Module
//!
//! Persistent storage layer: immutable sorted runs grouped into levels.
//!
//! ## Responsibilities
//! - Persist MemTable contents as sorted runs (three files each)
//! - Logarithmic point lookups through the offset index
//! - Merge runs across levels for compaction and ordered scans
//! - Keep each level within its byte budget
//!
//! ## Layout
//! ```text
//! {data_dir}/levels/
//!   ├── level_0/   newest data, smallest capacity
//!   │     sst_l0_data_000001.bin
//!   │     sst_l0_index_000001.bin
//!   │     sst_l0_offset_000001.bin
//!   ├── level_1/   capacity = base * ratio^2
//!   └── ...
//! ```

pub mod compaction;
mod level;
mod manager;
pub mod merge;
pub mod sstable;

pub use compaction::{CompactionPlan, CompactionStats};
pub use level::LevelController;
pub use manager::LevelManager;
pub use merge::{KeySource, MemSource, MergeIterator, ScanSource, SourceRank};
pub use sstable::{
    DeadKeys, Direction, KeyFilter, Keynator, RunFiles, RunReader, RunScanner, RunWriter,
    SortedRun,
};
