/// Compaction: merges overflowing runs of one level into the next.
///
/// Uses [`CompactBuffer`] for the deduplicating k-way merge. Output runs are
/// written atomically before the files they replace are deleted, and a
/// target level that overflows in turn is compacted recursively.
use anyhow::Result;
use sstable::{CompactBuffer, SortedRun};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::Engine;

impl Engine {
    /// Compacts `level` into `level + 1` if it holds more runs than its
    /// capacity.
    ///
    /// Level 0 moves all of its runs down; level `L >= 1` moves only the runs
    /// at positions `>= 2^(L+1)`. Does nothing when the level is within
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure while writing merged runs.
    pub fn compact(&mut self, level: usize) -> Result<()> {
        let capacity = self.level_capacity(level);
        if self.levels.run_count(level) <= capacity {
            return Ok(());
        }
        let moving = if level == 0 {
            self.levels.take_level(0)
        } else {
            self.levels.take_from(level, capacity)
        };
        self.merge_down(level, moving)
    }

    /// Merges `runs`, just removed from `level`, into `level + 1`.
    ///
    /// # Steps
    ///
    /// 1. Pull every target-level run overlapping the moving key range into
    ///    the merge.
    /// 2. Merge: the moving runs beat target-level runs on a shared key, and
    ///    otherwise the newest timestamp wins. Tombstones are dropped only if
    ///    the target level and everything below it were empty.
    /// 3. Chunk the output into page-sized runs and write every file.
    /// 4. Register the outputs, then delete the replaced files except paths
    ///    an output reused.
    /// 5. Cascade if the target level now exceeds its capacity.
    ///
    /// If writing any output fails, the input runs go back into the level
    /// manager, the outputs written so far are removed, and the error is
    /// returned.
    pub(crate) fn merge_down(&mut self, level: usize, runs: Vec<SortedRun>) -> Result<()> {
        if runs.is_empty() {
            return Ok(());
        }
        let target = level + 1;
        let next_level_empty = self.levels.is_empty_from(target);

        let mut buffer = CompactBuffer::new();
        buffer.extend(runs);
        if let Some((lo, hi)) = buffer.key_range() {
            buffer.extend_lower(self.levels.intersecting_runs(target, lo, hi));
        }
        let old_paths: Vec<PathBuf> = buffer.runs().map(|r| self.run_path(r)).collect();
        let input_runs = buffer.len();

        let output = buffer.merge(next_level_empty);
        let merged_entries = output.entries.len();
        let timestamp = output.timestamp;
        let first_id = self.levels.run_count(target);
        let new_runs = output.into_runs(target, first_id, self.config.page_size);
        let output_runs = new_runs.len();

        let mut new_paths = HashSet::with_capacity(new_runs.len());
        for run in &new_runs {
            match self.write_run(run) {
                Ok(path) => {
                    new_paths.insert(path);
                }
                Err(e) => {
                    self.abort_merge(buffer, &new_paths, &old_paths);
                    return Err(e.context(format!(
                        "compacting level {} -> {}",
                        level, target
                    )));
                }
            }
        }
        for run in new_runs {
            self.levels.push(run);
        }
        for path in old_paths.iter().filter(|p| !new_paths.contains(*p)) {
            remove_run_file(path);
        }

        log::info!(
            "compacted level {} -> {}: {} runs in, {} runs out, {} entries (timestamp {}, tombstones {})",
            level,
            target,
            input_runs,
            output_runs,
            merged_entries,
            timestamp,
            if next_level_empty { "dropped" } else { "kept" }
        );

        if self.levels.run_count(target) > self.level_capacity(target) {
            self.compact(target)?;
        }
        Ok(())
    }

    /// Undoes a compaction whose outputs could not all be written.
    fn abort_merge(
        &mut self,
        buffer: CompactBuffer,
        written: &HashSet<PathBuf>,
        old_paths: &[PathBuf],
    ) {
        // A written path equal to an input path replaced that input's file
        // with the merged image; keep it.
        for path in written.iter().filter(|p| !old_paths.contains(*p)) {
            remove_run_file(path);
        }
        let (upper, lower) = buffer.into_parts();
        log::warn!(
            "compaction aborted: restoring {} moving and {} target-level runs",
            upper.len(),
            lower.len()
        );
        self.levels.restore(upper.into_iter().chain(lower));
    }
}

fn remove_run_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to remove {}: {}", path.display(), e),
    }
}
