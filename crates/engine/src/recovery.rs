/// Cold-start loading of level directories, plus `reset()`.
///
/// Each `level-<L>` directory under the data root is scanned for `.sst`
/// files. Leftover `.sst.tmp` files from interrupted writes are deleted and
/// files that fail to decode are skipped with a warning, so one damaged run
/// does not block the rest of the store from opening.
use anyhow::{Context, Result};
use sstable::Header;
use std::path::{Path, PathBuf};

use crate::{Engine, LevelManager};

impl Engine {
    /// Builds a [`LevelManager`] from the level directories under `root`.
    ///
    /// Within a level, ids follow `(timestamp, min_key)` order.
    pub(crate) fn load_levels(root: &Path) -> Result<LevelManager> {
        let mut levels = LevelManager::new();
        for (level, dir) in Self::level_dirs(root)? {
            Self::cleanup_tmp_files(&dir);

            let mut found: Vec<(Header, PathBuf, Vec<u8>)> = Vec::new();
            for path in sst_files(&dir)? {
                let bytes = match std::fs::read(&path) {
                    Ok(b) => b,
                    Err(e) => {
                        log::warn!("skipping unreadable run {}: {}", path.display(), e);
                        continue;
                    }
                };
                match Header::read_from(&mut bytes.as_slice()) {
                    Ok(header) => found.push((header, path, bytes)),
                    Err(e) => log::warn!("skipping run {} with bad header: {}", path.display(), e),
                }
            }
            found.sort_by_key(|(h, _, _)| (h.timestamp, h.min_key));

            for (header, path, bytes) in found {
                let id = levels.run_count(level);
                match levels.load(level, id, &bytes) {
                    Ok(()) => log::debug!(
                        "loaded {} as level {} id {} ({} entries)",
                        path.display(),
                        level,
                        id,
                        header.count
                    ),
                    Err(e) => log::warn!("skipping corrupt run {}: {:#}", path.display(), e),
                }
            }
        }
        Ok(levels)
    }

    /// `(level, path)` for every `level-<L>` directory under `root`, by level.
    fn level_dirs(root: &Path) -> Result<Vec<(usize, PathBuf)>> {
        let mut dirs: Vec<(usize, PathBuf)> = std::fs::read_dir(root)
            .with_context(|| format!("listing {}", root.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                let level = p
                    .file_name()?
                    .to_str()?
                    .strip_prefix("level-")?
                    .parse()
                    .ok()?;
                Some((level, p))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Cleans up leftover `.sst.tmp` files from interrupted writes.
    pub(crate) fn cleanup_tmp_files(dir: &Path) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let p = entry.path();
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    if name.ends_with(".sst.tmp") {
                        log::debug!("removing leftover {}", p.display());
                        let _ = std::fs::remove_file(&p);
                    }
                }
            }
        }
    }

    /// Drops every key: clears the memtable, deletes the value log and all
    /// level directories, and restarts the timestamp counter at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if a file or directory cannot be removed.
    pub fn reset(&mut self) -> Result<()> {
        self.mem.clear();
        self.vlog.reset()?;
        self.levels.clear();
        for (_, dir) in Self::level_dirs(&self.config.dir)? {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("removing {}", dir.display()))?;
        }
        self.next_timestamp = 1;
        log::info!("engine at {} reset", self.config.dir.display());
        Ok(())
    }
}

fn sst_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "sst").unwrap_or(false))
        .collect();
    paths.sort();
    Ok(paths)
}
