//! K-way merge over sorted runs, plus output chunking.
//!
//! Produces locators in ascending key order. When the same key appears in
//! several runs only one entry is emitted; the others are dropped. The
//! winner comes from the lowest tier, then the **largest timestamp**, then
//! the lower source index so the result is deterministic.
//!
//! Tiers rank sources from different levels: a compaction merges the runs
//! moving down (tier 0) with the overlapping runs already in the target
//! level (tier 1). A shallower level always holds the newer write for a key,
//! even when a deeper run was stamped with a larger merge timestamp.
//! Ranking tier before timestamp is intentional: it is the merge-side
//! counterpart of the shallowest-level-first rule in point lookups.
//!
//! [`CompactBuffer`] is the compaction front end: collect the runs slated for
//! merging, merge them once, then slice the output into page-bounded runs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use vlog::ValueLocator;

use crate::format::max_entries_per_run;
use crate::SortedRun;

/// The current front entry of one source run.
struct HeapEntry {
    key: u64,
    tier: usize,
    timestamp: u64,
    /// Index into the `sources` array.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: smallest key first, then lowest tier,
        // then newest timestamp, then lowest source index.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.tier.cmp(&self.tier))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges several locator streams into one deduplicated, sorted stream.
///
/// Each yielded item is the winning locator for its key together with the
/// timestamp of the run it came from.
pub struct MergeIterator<'a> {
    /// `(tier, timestamp, locators)` per source.
    sources: Vec<(usize, u64, &'a [ValueLocator])>,
    /// Per-source cursor into its slice.
    cursors: Vec<usize>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Builds a single-tier merge over `(timestamp, locators)` sources;
    /// every slice must be sorted ascending by key with unique keys.
    pub fn new(sources: Vec<(u64, &'a [ValueLocator])>) -> Self {
        Self::tiered(sources.into_iter().map(|(ts, e)| (0, ts, e)).collect())
    }

    /// Builds a merge over `(tier, timestamp, locators)` sources.
    pub fn tiered(sources: Vec<(usize, u64, &'a [ValueLocator])>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (i, (tier, ts, entries)) in sources.iter().enumerate() {
            if let Some(first) = entries.first() {
                heap.push(HeapEntry {
                    key: first.key,
                    tier: *tier,
                    timestamp: *ts,
                    source: i,
                });
            }
        }
        let cursors = vec![0; sources.len()];
        Self {
            sources,
            cursors,
            heap,
        }
    }

    /// Merge over whole runs, using each run's own timestamp.
    pub fn over_runs<I>(runs: I) -> Self
    where
        I: IntoIterator<Item = &'a SortedRun>,
    {
        Self::new(
            runs.into_iter()
                .map(|r| (r.timestamp(), r.entries()))
                .collect(),
        )
    }

    /// Pops the heap top, advances its source and returns the popped locator.
    fn pop_front(&mut self) -> Option<(ValueLocator, u64)> {
        let top = self.heap.pop()?;
        let (tier, ts, entries) = self.sources[top.source];
        let cursor = &mut self.cursors[top.source];
        let loc = entries[*cursor];
        *cursor += 1;
        if let Some(next) = entries.get(*cursor) {
            self.heap.push(HeapEntry {
                key: next.key,
                tier,
                timestamp: ts,
                source: top.source,
            });
        }
        Some((loc, ts))
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = (ValueLocator, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let winner = self.pop_front()?;
        // Remaining entries for this key lost; drop them.
        while self.heap.peek().is_some_and(|p| p.key == winner.0.key) {
            self.pop_front();
        }
        Some(winner)
    }
}

/// The merged, deduplicated output of a compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    /// Maximum timestamp over all inputs; every output run carries it.
    pub timestamp: u64,
    pub entries: Vec<ValueLocator>,
}

impl MergeOutput {
    /// Slices the merged entries into runs that each fit in `page_size`
    /// bytes, with ids counting up from `first_id`.
    ///
    /// Each chunk gets its own bloom filter over exactly its keys. An empty
    /// output yields no runs.
    pub fn into_runs(self, level: usize, first_id: usize, page_size: usize) -> Vec<SortedRun> {
        let per_run = max_entries_per_run(page_size).max(1);
        let timestamp = self.timestamp;
        self.entries
            .chunks(per_run)
            .enumerate()
            .map(|(i, chunk)| {
                SortedRun::from_entries(level, first_id + i, timestamp, chunk.to_vec())
            })
            .collect()
    }
}

/// Runs slated for one compaction step.
///
/// `upper` holds the runs moving down; `lower` holds the target-level runs
/// they overlap, which lose every key conflict with `upper`.
#[derive(Debug, Default)]
pub struct CompactBuffer {
    upper: Vec<SortedRun>,
    lower: Vec<SortedRun>,
}

impl CompactBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, run: SortedRun) {
        self.upper.push(run);
    }

    pub fn extend<I: IntoIterator<Item = SortedRun>>(&mut self, runs: I) {
        self.upper.extend(runs);
    }

    /// Adds runs from the level being merged into.
    pub fn extend_lower<I: IntoIterator<Item = SortedRun>>(&mut self, runs: I) {
        self.lower.extend(runs);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.upper.len() + self.lower.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upper.is_empty() && self.lower.is_empty()
    }

    /// All buffered runs, moving runs first.
    pub fn runs(&self) -> impl Iterator<Item = &SortedRun> + '_ {
        self.upper.iter().chain(&self.lower)
    }

    /// Hands back the buffered runs as `(upper, lower)`.
    pub fn into_parts(self) -> (Vec<SortedRun>, Vec<SortedRun>) {
        (self.upper, self.lower)
    }

    /// Smallest `min_key` and largest `max_key` over the non-empty runs.
    #[must_use]
    pub fn key_range(&self) -> Option<(u64, u64)> {
        self.runs()
            .filter(|r| !r.is_empty())
            .fold(None, |acc, r| match acc {
                None => Some((r.min_key(), r.max_key())),
                Some((lo, hi)) => Some((lo.min(r.min_key()), hi.max(r.max_key()))),
            })
    }

    /// Merges all buffered runs.
    ///
    /// Tombstones are dropped only when `next_level_empty` is set, i.e. when
    /// nothing below the target level could still hold an older value.
    #[must_use]
    pub fn merge(&self, next_level_empty: bool) -> MergeOutput {
        let timestamp = self.runs().map(SortedRun::timestamp).max().unwrap_or(0);
        let sources = self
            .upper
            .iter()
            .map(|r| (0, r.timestamp(), r.entries()))
            .chain(self.lower.iter().map(|r| (1, r.timestamp(), r.entries())))
            .collect();
        let entries = MergeIterator::tiered(sources)
            .map(|(loc, _)| loc)
            .filter(|loc| !(next_level_empty && loc.is_tombstone()))
            .collect();
        MergeOutput { timestamp, entries }
    }
}
