/// Value-log garbage collection.
///
/// Walks records from the tail; any record still referenced by the level
/// manager is re-inserted so a later flush appends it at the head. The
/// scanned prefix is then released.
use anyhow::Result;

use crate::Engine;

/// What one [`Engine::gc`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Bytes released from the tail.
    pub reclaimed: u64,
    /// Records examined.
    pub scanned_records: usize,
    /// Live records rewritten at the head.
    pub relocated: usize,
}

impl Engine {
    /// Reclaims at least `min_bytes` from the value-log tail, or everything
    /// up to the current head if there is less.
    ///
    /// A record is live when the level manager's newest locator for its key
    /// points at exactly this record with a nonzero length. Live records are
    /// re-put unless the memtable already holds an entry (value or tombstone)
    /// for the key, which supersedes them. The memtable is flushed before the
    /// range is released, so every relocated value is durable first.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from reading the log, flushing, or releasing
    /// the range.
    pub fn gc(&mut self, min_bytes: u64) -> Result<GcStats> {
        let tail = self.vlog.tail();
        let end = self.vlog.head();
        let mut stats = GcStats::default();
        let mut pos = tail;

        while pos - tail < min_bytes && pos < end {
            match self.vlog.next_record(pos)? {
                Some(record) if record.offset < end => {
                    stats.scanned_records += 1;
                    let live = self.levels.lookup(record.key).is_some_and(|hit| {
                        hit.locator.offset == record.offset && !hit.locator.is_tombstone()
                    });
                    pos = record.end();
                    if live && !self.mem.contains_key(record.key) {
                        self.insert(record.key, Some(record.value))?;
                        stats.relocated += 1;
                    }
                }
                // Only unverifiable bytes remain before the old head.
                _ => pos = end,
            }
        }

        self.flush()?;
        stats.reclaimed = pos - tail;
        self.vlog.reclaim(tail, stats.reclaimed)?;

        log::info!(
            "gc reclaimed {} bytes ({} records scanned, {} relocated), vlog now [{}, {})",
            stats.reclaimed,
            stats.scanned_records,
            stats.relocated,
            self.vlog.tail(),
            self.vlog.head()
        );
        Ok(stats)
    }
}
