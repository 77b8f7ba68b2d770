/// Read path: `get()`, `scan()` and `merge_scan()`.
///
/// Point lookups check the memtable first, then the level manager, and only
/// touch the value log for a live locator.
use anyhow::Result;
use sstable::MergeIterator;
use std::collections::BTreeMap;
use vlog::ValueLocator;

use crate::Engine;

impl Engine {
    /// Looks up `key`, returning its value if present and live.
    ///
    /// A memtable tombstone or a zero-length locator both mean "not found".
    ///
    /// # Errors
    ///
    /// Returns an error if the value log read fails.
    pub fn get(&mut self, key: u64) -> Result<Option<Vec<u8>>> {
        match self.mem.get_entry(key) {
            Some(Some(value)) => return Ok(Some(value.to_vec())),
            Some(None) => return Ok(None),
            None => {}
        }
        match self.levels.lookup(key) {
            Some(hit) if !hit.locator.is_tombstone() => {
                let value = self.vlog.read(hit.locator.offset, hit.locator.len)?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// Returns every live `(key, value)` with `lo <= key <= hi`, ascending.
    ///
    /// Issues one [`get`](Engine::get) per key in the range, so the cost is
    /// proportional to `hi - lo` rather than to the number of live keys.
    /// Callers must keep the range bounded; see [`merge_scan`](Engine::merge_scan).
    pub fn scan(&mut self, lo: u64, hi: u64) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        if lo > hi {
            return Ok(out);
        }
        for key in lo..=hi {
            if let Some(value) = self.get(key)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Single-pass range scan over the memtable and all runs touching
    /// `[lo, hi]`.
    ///
    /// Resolves each key exactly like [`get`](Engine::get): the memtable
    /// wins, then the shallowest level holding the key, and within that
    /// level the run with the largest timestamp. Tombstones are dropped.
    pub fn merge_scan(&mut self, lo: u64, hi: u64) -> Result<Vec<(u64, Vec<u8>)>> {
        if lo > hi {
            return Ok(Vec::new());
        }

        let mut located: BTreeMap<u64, ValueLocator> = BTreeMap::new();
        for (_, runs) in self.levels.iter() {
            let sources: Vec<_> = runs
                .iter()
                .filter(|r| r.intersects(lo, hi))
                .map(|r| (r.timestamp(), r.range(lo, hi)))
                .collect();
            for (loc, _) in MergeIterator::new(sources) {
                // A shallower level already decided this key.
                located.entry(loc.key).or_insert(loc);
            }
        }

        let mut out = Vec::new();
        let mut mem = self.mem.range(lo, hi).peekable();
        let mut runs = located.into_values().peekable();
        loop {
            let take_mem = match (mem.peek(), runs.peek()) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some((mk, _)), Some(loc)) => *mk <= loc.key,
            };
            if take_mem {
                if let Some((key, value)) = mem.next() {
                    if runs.peek().is_some_and(|loc| loc.key == key) {
                        runs.next();
                    }
                    if let Some(v) = value {
                        out.push((key, v.to_vec()));
                    }
                }
            } else if let Some(loc) = runs.next() {
                if !loc.is_tombstone() {
                    out.push((loc.key, self.vlog.read(loc.offset, loc.len)?));
                }
            }
        }
        Ok(out)
    }
}
