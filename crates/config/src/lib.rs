//! # Config - Engine Settings
//!
//! [`EngineConfig`] gathers everything the engine needs at open time. Values
//! come from [`Default`], builder-style `with_*` setters, or the environment
//! via [`EngineConfig::from_env`]:
//!
//! ```text
//! LSMKV_DIR         Level directory root      (default: "data")
//! LSMKV_VLOG        Value log file path       (default: "data/vlog")
//! LSMKV_PAGE_SIZE   Run file size bound, B    (default: 16384)
//! LSMKV_L0_TRIGGER  Level-0 run limit         (default: 2)
//! LSMKV_SYNC        fsync every vlog append   (default: "false")
//! ```

use anyhow::{ensure, Result};
use std::path::{Path, PathBuf};

use sstable::{BASE_BYTES, DEFAULT_PAGE_SIZE, ENTRY_BYTES};

/// Level 0 is compacted once it holds more than this many runs.
pub const DEFAULT_L0_TRIGGER: usize = 2;

/// Settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root under which `level-<L>` directories live.
    pub dir: PathBuf,
    pub vlog_path: PathBuf,
    /// Upper bound on the encoded size of one run file; also the memtable
    /// flush threshold.
    pub page_size: usize,
    pub l0_trigger: usize,
    pub sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            vlog_path: PathBuf::from("data").join("vlog"),
            page_size: DEFAULT_PAGE_SIZE,
            l0_trigger: DEFAULT_L0_TRIGGER,
            sync: false,
        }
    }
}

impl EngineConfig {
    /// Default settings rooted at `dir`, with the value log at `dir/vlog`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            vlog_path: dir.join("vlog"),
            dir,
            ..Self::default()
        }
    }

    /// Reads overrides from `LSMKV_*` environment variables. Unset or
    /// unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dir = PathBuf::from(env_or("LSMKV_DIR", "data"));
        let vlog_path = std::env::var("LSMKV_VLOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dir.join("vlog"));
        Self {
            page_size: env_or("LSMKV_PAGE_SIZE", "")
                .parse()
                .unwrap_or(defaults.page_size),
            l0_trigger: env_or("LSMKV_L0_TRIGGER", "")
                .parse()
                .unwrap_or(defaults.l0_trigger),
            sync: env_or("LSMKV_SYNC", "").parse().unwrap_or(defaults.sync),
            dir,
            vlog_path,
        }
    }

    pub fn with_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_vlog_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.vlog_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_l0_trigger(mut self, trigger: usize) -> Self {
        self.l0_trigger = trigger;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Entries one memtable flush (or one compaction chunk) may hold.
    #[must_use]
    pub fn entries_per_run(&self) -> usize {
        sstable::max_entries_per_run(self.page_size)
    }

    /// Checks that the settings describe a usable engine.
    ///
    /// # Errors
    ///
    /// Fails if a run of `page_size` bytes cannot hold at least one entry.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.page_size >= BASE_BYTES + ENTRY_BYTES,
            "page size {} too small: a run needs {} bytes for header and bloom filter plus {} per entry",
            self.page_size,
            BASE_BYTES,
            ENTRY_BYTES
        );
        ensure!(
            !self.dir.as_os_str().is_empty(),
            "data directory must not be empty"
        );
        ensure!(
            !self.vlog_path.as_os_str().is_empty(),
            "value log path must not be empty"
        );
        Ok(())
    }
}

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
