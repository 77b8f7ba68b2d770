use anyhow::{Context, Result};
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::SortedRun;

/// Writes [`SortedRun`]s to disk as immutable run files.
///
/// The write is crash-safe: bytes go to `<name>.sst.tmp` first, are synced,
/// and the temp file is then atomically renamed over the final path. A crash
/// mid-write leaves only the temp file behind, which recovery deletes.
pub struct RunWriter {}

impl RunWriter {
    /// Serializes `run` to `path`.
    ///
    /// # Errors
    ///
    /// Any I/O failure while creating, writing, syncing or renaming the file.
    pub fn write(path: &Path, run: &SortedRun) -> Result<()> {
        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let mut file = BufWriter::new(raw_file);

        file.write_all(&run.encode())?;
        file.flush()?;
        file.into_inner()?.sync_all()?;

        rename(&tmp_path, path)
            .with_context(|| format!("renaming {} into place", tmp_path.display()))?;

        // A crash after rename but before the directory sync can lose the entry.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        log::debug!(
            "wrote run {} ({} entries, level {})",
            path.display(),
            run.len(),
            run.level()
        );
        Ok(())
    }
}
