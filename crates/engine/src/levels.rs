//! Level bookkeeping: which sorted runs exist, at which level, in which order.
//!
//! [`LevelManager`] is the sole owner of every [`SortedRun`]. Ids are ranks
//! within a level and are kept contiguous from 0; every removal renumbers
//! the survivors.

use anyhow::{Context, Result};
use sstable::SortedRun;
use vlog::ValueLocator;

/// A point-lookup match: the winning run's position and its locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHit {
    pub level: usize,
    pub id: usize,
    pub timestamp: u64,
    pub locator: ValueLocator,
}

/// Runs grouped by level, each level ordered by id.
#[derive(Debug, Default)]
pub struct LevelManager {
    levels: Vec<Vec<SortedRun>>,
}

impl LevelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a run image and inserts it at `(level, id)`.
    ///
    /// Runs already at or after `id` shift up by one; an `id` past the end
    /// appends.
    pub fn load(&mut self, level: usize, id: usize, bytes: &[u8]) -> Result<()> {
        let run = SortedRun::decode(level, id, bytes)
            .with_context(|| format!("decoding run {} at level {}", id, level))?;
        self.insert(run);
        Ok(())
    }

    /// Inserts `run` at its own `(level, id)` position.
    pub fn insert(&mut self, run: SortedRun) {
        let level = run.level();
        let runs = self.level_mut(level);
        let at = run.id().min(runs.len());
        runs.insert(at, run);
        renumber(runs);
    }

    /// Appends `run` to the end of its level, returning the assigned id.
    pub fn push(&mut self, mut run: SortedRun) -> usize {
        let runs = self.level_mut(run.level());
        let id = runs.len();
        run.set_id(id);
        runs.push(run);
        id
    }

    /// Finds the current locator for `key`.
    ///
    /// Levels are scanned shallow to deep. Among all matches seen so far the
    /// one with the largest timestamp is kept, and the scan stops after the
    /// first level that produced any match.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<RunHit> {
        let mut best: Option<RunHit> = None;
        for (level, runs) in self.levels.iter().enumerate() {
            for run in runs {
                if let Some(locator) = run.lookup(key) {
                    if best.map_or(true, |b| run.timestamp() > b.timestamp) {
                        best = Some(RunHit {
                            level,
                            id: run.id(),
                            timestamp: run.timestamp(),
                            locator,
                        });
                    }
                }
            }
            if best.is_some() {
                break;
            }
        }
        best
    }

    /// Removes and returns every run at `level` whose key range overlaps
    /// `[lo, hi]`. The remaining runs are renumbered from 0.
    pub fn intersecting_runs(&mut self, level: usize, lo: u64, hi: u64) -> Vec<SortedRun> {
        let Some(runs) = self.levels.get_mut(level) else {
            return Vec::new();
        };
        let (hit, keep): (Vec<_>, Vec<_>) =
            runs.drain(..).partition(|r| r.intersects(lo, hi));
        *runs = keep;
        renumber(runs);
        hit
    }

    /// Removes and returns all runs at `level`.
    pub fn take_level(&mut self, level: usize) -> Vec<SortedRun> {
        self.levels
            .get_mut(level)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Removes and returns the runs at `level` with id `>= start`.
    pub fn take_from(&mut self, level: usize, start: usize) -> Vec<SortedRun> {
        match self.levels.get_mut(level) {
            Some(runs) if start < runs.len() => runs.split_off(start),
            _ => Vec::new(),
        }
    }

    /// Puts runs back into their own levels after an aborted compaction.
    ///
    /// Each touched level is re-sorted by `(timestamp, min_key)`, the order
    /// recovery uses, and renumbered.
    pub fn restore<I: IntoIterator<Item = SortedRun>>(&mut self, runs: I) {
        let mut touched = Vec::new();
        for run in runs {
            let level = run.level();
            self.level_mut(level).push(run);
            if !touched.contains(&level) {
                touched.push(level);
            }
        }
        for level in touched {
            let runs = self.level_mut(level);
            runs.sort_by_key(|r| (r.timestamp(), r.min_key()));
            renumber(runs);
        }
    }

    /// Removes the run at `(level, id)` and renumbers the rest.
    pub fn delete_run(&mut self, level: usize, id: usize) -> Option<SortedRun> {
        let runs = self.levels.get_mut(level)?;
        if id >= runs.len() {
            return None;
        }
        let run = runs.remove(id);
        renumber(runs);
        Some(run)
    }

    /// Moves the run at `old_id` to position `new_id` (clamped to the end).
    pub fn reassign_id(&mut self, level: usize, old_id: usize, new_id: usize) -> bool {
        let Some(runs) = self.levels.get_mut(level) else {
            return false;
        };
        if old_id >= runs.len() {
            return false;
        }
        let run = runs.remove(old_id);
        let at = new_id.min(runs.len());
        runs.insert(at, run);
        renumber(runs);
        true
    }

    /// Returns `true` if `level` and every deeper level hold no runs.
    #[must_use]
    pub fn is_empty_from(&self, level: usize) -> bool {
        self.levels.iter().skip(level).all(Vec::is_empty)
    }

    pub fn runs(&self, level: usize) -> &[SortedRun] {
        self.levels.get(level).map_or(&[][..], Vec::as_slice)
    }

    pub fn get(&self, level: usize, id: usize) -> Option<&SortedRun> {
        self.levels.get(level)?.get(id)
    }

    #[must_use]
    pub fn run_count(&self, level: usize) -> usize {
        self.runs(level).len()
    }

    #[must_use]
    pub fn total_runs(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// One past the deepest non-empty level.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(0, |i| i + 1)
    }

    #[must_use]
    pub fn max_timestamp(&self) -> Option<u64> {
        self.levels.iter().flatten().map(SortedRun::timestamp).max()
    }

    /// Iterates `(level, runs)` for every level slot, empty ones included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[SortedRun])> + '_ {
        self.levels.iter().enumerate().map(|(l, r)| (l, r.as_slice()))
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    fn level_mut(&mut self, level: usize) -> &mut Vec<SortedRun> {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        &mut self.levels[level]
    }
}

fn renumber(runs: &mut [SortedRun]) {
    for (id, run) in runs.iter_mut().enumerate() {
        run.set_id(id);
    }
}
