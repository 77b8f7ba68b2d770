//! # Engine - LSM Key-Value Store
//!
//! The orchestrator that ties the [`memtable`], [`vlog`] and [`sstable`]
//! crates into a complete LSM-tree key-value store with `u64` keys.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → Memtable insert                    │
//! │              |                                │
//! │              |  (next run would exceed page?) │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → vlog append + L0 run      │
//! │              |                                │
//! │              |  (L0 runs > trigger?)          │
//! │              |            yes                 │
//! │              v                                │
//! │           compact(0) → L1 → L2 ... (cascade)  │
//! │                                               │
//! │ read.rs → Memtable → levels → vlog payload    │
//! │ gc.rs   → rescan vlog tail, re-put live data  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                |
//! |----------------|--------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, constructor, accessors, `Debug`, `Drop` |
//! | [`levels`]     | `LevelManager`: run ownership, lookup, range removal   |
//! | `recovery`     | Loading level directories, tmp cleanup, `reset()`      |
//! | `write`        | `put()`, `del()`, `force_flush()`, internal `flush()`  |
//! | `read`         | `get()`, `scan()`, `merge_scan()`                      |
//! | `compaction`   | `compact()` with cascading merge into deeper levels    |
//! | `gc`           | `gc()`: value-log reclamation                          |
//!
//! ## On-disk layout
//!
//! ```text
//! <dir>/level-0/sst-<min>-<max>-<timestamp>.sst
//! <dir>/level-1/...
//! <vlog path>
//! ```
//!
//! Level 0 runs come straight from flushes and may overlap. Deeper levels
//! are produced by merges and hold disjoint key ranges. Level 0 is compacted
//! once it holds more than `l0_trigger` runs; level `L >= 1` holds at most
//! `2^(L+1)` runs before its overflow moves down.
//!
//! ## Durability
//!
//! The memtable is volatile: writes become durable at the next flush, and
//! dropping the engine flushes on a best-effort basis. Run files are written
//! atomically via temp file + rename.
mod compaction;
mod gc;
pub mod levels;
mod read;
mod recovery;
mod write;

use anyhow::{Context, Result};
pub use config::EngineConfig;
pub use gc::GcStats;
pub use levels::{LevelManager, RunHit};
use memtable::Memtable;
use sstable::{RunWriter, SortedRun};
use std::path::{Path, PathBuf};
use vlog::ValueLog;

/// The central storage engine orchestrating the memtable, sorted runs and
/// the value log.
///
/// # Write Path
///
/// 1. If one more entry would push the memtable's flushed size past the page
///    size, flush it first.
/// 2. Insert the value (or tombstone) into the memtable.
///
/// # Read Path
///
/// 1. Check the memtable (freshest data, includes tombstones).
/// 2. Ask the [`LevelManager`] for the newest locator.
/// 3. Read the payload from the value log unless it is a tombstone.
pub struct Engine {
    pub(crate) mem: Memtable,
    pub(crate) levels: LevelManager,
    pub(crate) vlog: ValueLog,
    pub(crate) config: EngineConfig,

    /// Timestamp handed to the next flushed run. Starts at 1.
    pub(crate) next_timestamp: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let per_level: Vec<usize> = self.levels.iter().map(|(_, runs)| runs.len()).collect();
        f.debug_struct("Engine")
            .field("dir", &self.config.dir)
            .field("vlog_path", &self.config.vlog_path)
            .field("page_size", &self.config.page_size)
            .field("l0_trigger", &self.config.l0_trigger)
            .field("next_timestamp", &self.next_timestamp)
            .field("memtable_entries", &self.mem.len())
            .field("runs_per_level", &per_level)
            .field("vlog_tail", &self.vlog.tail())
            .field("vlog_head", &self.vlog.head())
            .finish()
    }
}

impl Engine {
    /// Opens the store described by `config`, recovering any existing runs
    /// and the value log.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate the config and create the data directory.
    /// 2. Open the value log and re-derive its head and tail.
    /// 3. Load every `level-<L>` directory, removing leftover `.sst.tmp`
    ///    files and skipping run files that fail to decode.
    /// 4. Resume the timestamp counter after the newest loaded run.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("creating data dir {}", config.dir.display()))?;

        let vlog = ValueLog::open(&config.vlog_path, config.sync)
            .with_context(|| format!("opening value log {}", config.vlog_path.display()))?;
        let levels = Self::load_levels(&config.dir)?;
        let next_timestamp = levels.max_timestamp().map_or(1, |ts| ts + 1);

        log::info!(
            "engine opened at {}: {} runs over {} levels, next timestamp {}, vlog [{}, {})",
            config.dir.display(),
            levels.total_runs(),
            levels.level_count(),
            next_timestamp,
            vlog.tail(),
            vlog.head()
        );

        Ok(Self {
            mem: Memtable::new(),
            levels,
            vlog,
            config,
            next_timestamp,
        })
    }

    /// Opens a store rooted at `dir` with default settings.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(EngineConfig::in_dir(dir))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of the level set.
    #[must_use]
    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    /// The timestamp the next flush will use.
    #[must_use]
    pub fn next_timestamp(&self) -> u64 {
        self.next_timestamp
    }

    /// One past the deepest level holding any run.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.level_count()
    }

    #[must_use]
    pub fn level_run_count(&self, level: usize) -> usize {
        self.levels.run_count(level)
    }

    /// Total number of runs across all levels.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.levels.total_runs()
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn vlog_head(&self) -> u64 {
        self.vlog.head()
    }

    #[must_use]
    pub fn vlog_tail(&self) -> u64 {
        self.vlog.tail()
    }

    /// Maximum number of runs `level` may hold before it is compacted.
    #[must_use]
    pub fn level_capacity(&self, level: usize) -> usize {
        if level == 0 {
            self.config.l0_trigger
        } else {
            u32::try_from(level + 1)
                .ok()
                .and_then(|shift| 1usize.checked_shl(shift))
                .unwrap_or(usize::MAX)
        }
    }

    pub(crate) fn level_dir(&self, level: usize) -> PathBuf {
        level_dir(&self.config.dir, level)
    }

    pub(crate) fn run_path(&self, run: &SortedRun) -> PathBuf {
        self.level_dir(run.level()).join(run.file_name())
    }

    /// Writes `run` into its level directory and hands it to the level
    /// manager, which appends it with the next free id.
    pub(crate) fn install_run(&mut self, run: SortedRun) -> Result<PathBuf> {
        let path = self.write_run(&run)?;
        self.levels.push(run);
        Ok(path)
    }

    /// Writes `run` to its file without registering it.
    pub(crate) fn write_run(&self, run: &SortedRun) -> Result<PathBuf> {
        let dir = self.level_dir(run.level());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating level dir {}", dir.display()))?;
        let path = dir.join(run.file_name());
        RunWriter::write(&path, run)?;
        Ok(path)
    }

    /// Returns the current timestamp and advances the counter.
    pub(crate) fn bump_timestamp(&mut self) -> u64 {
        let ts = self.next_timestamp;
        self.next_timestamp += 1;
        ts
    }
}

pub(crate) fn level_dir(root: &Path, level: usize) -> PathBuf {
    root.join(format!("level-{}", level))
}

/// Best-effort flush on drop.
///
/// Anything still in the memtable is written out so it survives a clean
/// shutdown. Errors are ignored because Drop cannot propagate them.
impl Drop for Engine {
    fn drop(&mut self) {
        if !self.mem.is_empty() {
            if let Err(e) = self.flush() {
                log::warn!("flush on drop failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
