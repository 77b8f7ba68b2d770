/// Write path: `put()`, `del()`, `force_flush()`, and the internal `flush()`.
///
/// Mutations land in the memtable. Before an insert that would make the next
/// run larger than one page, the memtable is flushed: its entries go to the
/// value log and the returned locators become a new level-0 run.
use anyhow::{ensure, Result};
use memtable::Value;
use sstable::{encoded_size, SortedRun};
use vlog::MAX_VALUE_BYTES;

use crate::Engine;

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// Rejects empty values, since a zero length is how the value log marks
    /// a tombstone, and values over [`MAX_VALUE_BYTES`]. Also fails if a
    /// triggered flush or compaction fails.
    pub fn put(&mut self, key: u64, value: Vec<u8>) -> Result<()> {
        ensure!(!value.is_empty(), "value must not be empty");
        ensure!(
            value.len() <= MAX_VALUE_BYTES as usize,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_BYTES
        );
        self.insert(key, Some(value))
    }

    /// Deletes `key` by writing a tombstone. Returns whether the key was
    /// present; deleting a missing key writes nothing.
    pub fn del(&mut self, key: u64) -> Result<bool> {
        if self.get(key)?.is_none() {
            return Ok(false);
        }
        self.insert(key, None)?;
        Ok(true)
    }

    /// Flushes the memtable now. No-op if it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure while appending to the value log,
    /// writing the run, or compacting.
    pub fn force_flush(&mut self) -> Result<()> {
        self.flush()
    }

    pub(crate) fn insert(&mut self, key: u64, value: Value) -> Result<()> {
        if self.memtable_full() {
            self.flush()?;
        }
        self.mem.insert(key, value);
        Ok(())
    }

    /// `true` once one more entry would push the flushed run past a page.
    fn memtable_full(&self) -> bool {
        encoded_size(self.mem.len() + 1) > self.config.page_size
    }

    /// Internal flush implementation.
    ///
    /// # Steps
    ///
    /// 1. Append every memtable entry to the value log (tombstones write
    ///    nothing and get a zero-length locator).
    /// 2. Build a level-0 run from the locators and the memtable's bloom
    ///    bits, stamped with a fresh timestamp.
    /// 3. Write the run file atomically and register it.
    /// 4. Clear the memtable.
    /// 5. Compact level 0 if it now holds more than `l0_trigger` runs.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.mem.is_empty() {
            return Ok(());
        }

        let locators = self.vlog.append(self.mem.iter())?;
        let timestamp = self.bump_timestamp();
        let id = self.levels.run_count(0);
        let run = SortedRun::new(0, id, timestamp, locators, self.mem.bloom_bits());
        let count = run.len();
        let path = self.install_run(run)?;
        self.mem.clear();

        log::info!(
            "flushed {} entries to {} (timestamp {})",
            count,
            path.display(),
            timestamp
        );

        if self.levels.run_count(0) > self.level_capacity(0) {
            self.compact(0)?;
        }
        Ok(())
    }
}
