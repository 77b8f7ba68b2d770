use crate::*;
use anyhow::Result;
use sstable::{SortedRun, BASE_BYTES, ENTRY_BYTES};
use std::fs;
use std::path::Path;

/// Engine with default settings rooted at `dir`.
pub fn open(dir: &Path) -> Result<Engine> {
    Engine::open_dir(dir)
}

/// Engine whose runs hold at most `per_run` entries.
pub fn open_small(dir: &Path, per_run: usize, l0_trigger: usize) -> Result<Engine> {
    Engine::open(
        EngineConfig::in_dir(dir)
            .with_page_size(BASE_BYTES + per_run * ENTRY_BYTES)
            .with_l0_trigger(l0_trigger),
    )
}

/// `"x"` repeated `k + 1` times.
pub fn value_for(k: u64) -> Vec<u8> {
    vec![b'x'; k as usize + 1]
}

/// Appends `entries` to the value log and installs them as a run at
/// `(level, timestamp)`, bypassing flush and compaction.
pub fn place(
    engine: &mut Engine,
    level: usize,
    timestamp: u64,
    entries: &[(u64, Option<&[u8]>)],
) -> Result<()> {
    let locators = engine.vlog.append(entries.iter().copied())?;
    let run = SortedRun::from_entries(level, 0, timestamp, locators);
    engine.install_run(run)?;
    engine.next_timestamp = engine.next_timestamp.max(timestamp + 1);
    Ok(())
}

/// Number of `.sst` files across all level directories.
pub fn count_sst_files(root: &Path) -> usize {
    fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("level-"))
        .flat_map(|e| fs::read_dir(e.path()).unwrap().filter_map(|f| f.ok()))
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}

/// Every level within capacity.
pub fn assert_level_shape(engine: &Engine) {
    for level in 0..engine.level_count() {
        assert!(
            engine.level_run_count(level) <= engine.level_capacity(level),
            "level {} holds {} runs (capacity {})",
            level,
            engine.level_run_count(level),
            engine.level_capacity(level)
        );
    }
}
