use bloom::BloomFilter;
use std::io::Result as IoResult;
use vlog::ValueLocator;

use crate::format::{self, Header};

/// An immutable sorted run: header, bloom filter and key-ordered locators.
///
/// A run is identified inside its level by `(level, id)`. The id is its rank
/// within the level and is renumbered by the owner when siblings go away;
/// everything else is fixed at construction.
#[derive(Clone)]
pub struct SortedRun {
    header: Header,
    bloom: BloomFilter,
    entries: Vec<ValueLocator>,
    level: usize,
    id: usize,
}

impl SortedRun {
    /// Builds a run from locators sorted ascending with unique keys.
    ///
    /// An empty `entries` is logged and degrades to a zero-range run
    /// (`min_key == max_key == 0`, count 0).
    pub fn new(
        level: usize,
        id: usize,
        timestamp: u64,
        entries: Vec<ValueLocator>,
        bloom: BloomFilter,
    ) -> Self {
        debug_assert!(
            entries.windows(2).all(|w| w[0].key < w[1].key),
            "run entries must be strictly ascending"
        );
        let (min_key, max_key) = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => (first.key, last.key),
            _ => {
                log::warn!(
                    "building empty sorted run at level {} (timestamp {})",
                    level,
                    timestamp
                );
                (0, 0)
            }
        };
        Self {
            header: Header {
                timestamp,
                count: entries.len() as u64,
                min_key,
                max_key,
            },
            bloom,
            entries,
            level,
            id,
        }
    }

    /// Builds a run and computes its bloom filter from the entry keys.
    pub fn from_entries(level: usize, id: usize, timestamp: u64, entries: Vec<ValueLocator>) -> Self {
        let bloom = BloomFilter::from_keys(entries.iter().map(|e| e.key));
        Self::new(level, id, timestamp, entries, bloom)
    }

    /// Decodes a run image (see [`crate::format`]).
    pub fn decode(level: usize, id: usize, bytes: &[u8]) -> IoResult<Self> {
        let (header, bloom, entries) = format::decode(bytes)?;
        Ok(Self {
            header,
            bloom,
            entries,
            level,
            id,
        })
    }

    /// Serializes the run to its on-disk image.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(format::encoded_size(self.entries.len()));
        // Writing into a Vec cannot fail.
        let _ = self.header.write_to(&mut buf);
        let _ = self.bloom.write_to(&mut buf);
        for loc in &self.entries {
            let _ = format::write_entry(&mut buf, loc);
        }
        buf
    }

    /// Point lookup.
    ///
    /// Rejects keys outside `[min_key, max_key]`, then keys the filter rules
    /// out, then binary-searches for an exact match.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<ValueLocator> {
        if self.entries.is_empty() || key < self.header.min_key || key > self.header.max_key {
            return None;
        }
        if !self.bloom.may_contain(key) {
            return None;
        }
        self.entries
            .binary_search_by_key(&key, |e| e.key)
            .ok()
            .map(|idx| self.entries[idx])
    }

    /// Returns `true` if `[lo, hi]` overlaps this run's key range.
    #[must_use]
    pub fn intersects(&self, lo: u64, hi: u64) -> bool {
        !self.entries.is_empty() && self.header.min_key <= hi && self.header.max_key >= lo
    }

    /// Locators with `lo <= key <= hi`, ascending.
    pub fn range(&self, lo: u64, hi: u64) -> &[ValueLocator] {
        if lo > hi {
            return &[];
        }
        let start = self.entries.partition_point(|e| e.key < lo);
        let end = self.entries.partition_point(|e| e.key <= hi);
        &self.entries[start..end.max(start)]
    }

    /// Canonical file name: `sst-<min>-<max>-<timestamp>.sst`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "sst-{}-{}-{}.sst",
            self.header.min_key, self.header.max_key, self.header.timestamp
        )
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    #[must_use]
    pub fn min_key(&self) -> u64 {
        self.header.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> u64 {
        self.header.max_key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ValueLocator] {
        &self.entries
    }

    /// Consumes the run, returning its locators.
    pub fn into_entries(self) -> Vec<ValueLocator> {
        self.entries
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn set_level(&mut self, level: usize) {
        self.level = level;
    }
}

impl std::fmt::Debug for SortedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedRun")
            .field("level", &self.level)
            .field("id", &self.id)
            .field("timestamp", &self.header.timestamp)
            .field("count", &self.header.count)
            .field("min_key", &self.header.min_key)
            .field("max_key", &self.header.max_key)
            .finish()
    }
}
