//! # SSTable - Sorted Runs
//!
//! Immutable, on-disk sorted runs for the LSM store.
//!
//! A run is built once, either by flushing the memtable or by a compaction
//! merge, and never modified afterwards. It holds `(key, offset, len)`
//! locators into the value log rather than the values themselves.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (32 bytes)                                             │
//! │ time (u64) | count (u64) | min_key (u64) | max_key (u64)      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM (8192 bytes, 65536 bits, MSB-first)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ ENTRIES (20 bytes each, ascending by key)                     │
//! │ key (u64) | offset (u64) | vlen (u32)                         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `vlen == 0` marks a tombstone.
//!
//! ## Merging
//!
//! [`MergeIterator`] walks any number of runs in key order and keeps only the
//! newest entry per key. [`CompactBuffer`] wraps it for compaction and slices
//! the merged stream back into page-bounded runs.

pub mod format;
mod merge;
mod run;
mod writer;

pub use format::{
    encoded_size, max_entries_per_run, Header, BASE_BYTES, DEFAULT_PAGE_SIZE, ENTRY_BYTES,
    HEADER_BYTES,
};
pub use merge::{CompactBuffer, MergeIterator, MergeOutput};
pub use run::SortedRun;
pub use writer::RunWriter;

#[cfg(test)]
mod tests;
