//! # Memtable
//!
//! The in-memory write buffer: a probabilistic skip list keyed by `u64`.
//!
//! ```text
//! Level 2:  HEAD ──────────────────────────► 50 ──────────► NIL
//! Level 1:  HEAD ──────────► 20 ───────────► 50 ──► 60 ──► NIL
//! Level 0:  HEAD ──► 10 ──► 20 ──► 35 ─────► 50 ──► 60 ──► NIL
//! ```
//!
//! Nodes live in an arena (`Vec`) and link to each other by index, so there
//! is no unsafe code and no reference counting. Freed slots are recycled.
//!
//! Every new key is promoted to each successive level with probability 1/2.
//! Overwriting an existing key replaces its value in place without touching
//! its height. Removing a key unlinks it from every level it occupies and
//! shrinks the list height while the top level is empty.
use bloom::BloomFilter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound on the number of levels.
pub const MAX_HEIGHT: usize = 32;

/// A stored value. `None` signifies a tombstone (delete).
pub type Value = Option<Vec<u8>>;

struct Node {
    key: u64,
    value: Value,
    /// Forward links, one per level this node occupies.
    next: Vec<Option<usize>>,
}

pub struct Memtable {
    /// Arena of nodes; `None` marks a free slot.
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    /// First node at each level. `heads.len()` is the current height.
    heads: Vec<Option<usize>>,
    len: usize,
    /// Sum of live payload lengths.
    approx_size: usize,
    rng: StdRng,
}

impl Memtable {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a memtable whose level promotion is driven by a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            heads: Vec::new(),
            len: 0,
            approx_size: 0,
            rng,
        }
    }

    /// Inserts or overwrites `key`. Returns `true` if the key already existed.
    pub fn insert(&mut self, key: u64, value: Value) -> bool {
        let preds = self.predecessors(key);

        if let Some(found) = self.next_of(preds.first().copied().flatten(), 0) {
            if self.node(found).key == key {
                let new_len = value.as_ref().map_or(0, Vec::len);
                let node = self.node_mut(found);
                let old_len = node.value.as_ref().map_or(0, Vec::len);
                node.value = value;
                self.approx_size = self.approx_size - old_len + new_len;
                return true;
            }
        }

        let height = self.random_height();
        let mut preds = preds;
        while self.heads.len() < height {
            self.heads.push(None);
            preds.push(None);
        }

        let next: Vec<Option<usize>> = (0..height)
            .map(|level| self.next_of(preds[level], level))
            .collect();
        self.approx_size += value.as_ref().map_or(0, Vec::len);
        let idx = self.alloc(Node { key, value, next });
        for (level, pred) in preds.iter().enumerate().take(height) {
            self.set_next(*pred, level, Some(idx));
        }
        self.len += 1;
        false
    }

    /// Puts a live value. Returns `true` if the key already existed.
    pub fn put(&mut self, key: u64, value: Vec<u8>) -> bool {
        self.insert(key, Some(value))
    }

    /// Records a tombstone for `key`. Returns `true` if the key already existed.
    pub fn delete(&mut self, key: u64) -> bool {
        self.insert(key, None)
    }

    /// Physically unlinks `key` from every level. Returns `true` if it was present.
    pub fn remove(&mut self, key: u64) -> bool {
        let preds = self.predecessors(key);
        let target = match self.next_of(preds.first().copied().flatten(), 0) {
            Some(t) if self.node(t).key == key => t,
            _ => return false,
        };

        let links = self.node(target).next.clone();
        for (level, succ) in links.into_iter().enumerate() {
            self.set_next(preds[level], level, succ);
        }
        if let Some(node) = self.nodes[target].take() {
            self.approx_size -= node.value.as_ref().map_or(0, Vec::len);
        }
        self.free.push(target);
        self.len -= 1;

        while matches!(self.heads.last(), Some(None)) {
            self.heads.pop();
        }
        true
    }

    /// Returns the entry for `key`: `Some(Some(v))` for a value,
    /// `Some(None)` for a tombstone, `None` if the key is absent.
    pub fn get_entry(&self, key: u64) -> Option<Option<&[u8]>> {
        let idx = self.find(key)?;
        Some(self.node(idx).value.as_deref())
    }

    /// Returns the live value for `key`, hiding tombstones.
    pub fn get(&self, key: u64) -> Option<&[u8]> {
        self.get_entry(key).flatten()
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Ordered iterator over every entry, tombstones included.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            cursor: self.heads.first().copied().flatten(),
            hi: u64::MAX,
        }
    }

    /// Ordered iterator over entries with `lo <= key <= hi`, tombstones included.
    pub fn range(&self, lo: u64, hi: u64) -> Iter<'_> {
        let cursor = if lo > hi || self.heads.is_empty() {
            None
        } else {
            let preds = self.predecessors(lo);
            self.next_of(preds[0], 0)
        };
        Iter {
            table: self,
            cursor,
            hi,
        }
    }

    /// Live `(key, value)` pairs with `lo <= key <= hi`, ascending.
    pub fn scan(&self, lo: u64, hi: u64) -> Vec<(u64, Vec<u8>)> {
        self.range(lo, hi)
            .filter_map(|(k, v)| v.map(|v| (k, v.to_vec())))
            .collect()
    }

    /// Copies out every entry in key order, tombstones included.
    pub fn export_all(&self) -> Vec<(u64, Value)> {
        self.iter().map(|(k, v)| (k, v.map(<[u8]>::to_vec))).collect()
    }

    pub fn min_key(&self) -> Option<u64> {
        self.heads
            .first()
            .copied()
            .flatten()
            .map(|idx| self.node(idx).key)
    }

    pub fn max_key(&self) -> Option<u64> {
        let mut cur = None;
        for level in (0..self.heads.len()).rev() {
            while let Some(n) = self.next_of(cur, level) {
                cur = Some(n);
            }
        }
        cur.map(|idx| self.node(idx).key)
    }

    /// Bloom filter over every key currently held (tombstones included).
    pub fn bloom_bits(&self) -> BloomFilter {
        BloomFilter::from_keys(self.iter().map(|(k, _)| k))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current number of levels.
    pub fn height(&self) -> usize {
        self.heads.len()
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Drops every entry, keeping the arena allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.heads.clear();
        self.len = 0;
        self.approx_size = 0;
    }

    // ---- Internal helpers ----

    fn find(&self, key: u64) -> Option<usize> {
        if self.heads.is_empty() {
            return None;
        }
        let preds = self.predecessors(key);
        self.next_of(preds[0], 0)
            .filter(|&idx| self.node(idx).key == key)
    }

    /// For every level, the last node with a key strictly below `key`
    /// (`None` stands for the head).
    fn predecessors(&self, key: u64) -> Vec<Option<usize>> {
        let mut preds = vec![None; self.heads.len()];
        let mut cur = None;
        for level in (0..self.heads.len()).rev() {
            while let Some(n) = self.next_of(cur, level) {
                if self.node(n).key >= key {
                    break;
                }
                cur = Some(n);
            }
            preds[level] = cur;
        }
        preds
    }

    fn next_of(&self, from: Option<usize>, level: usize) -> Option<usize> {
        match from {
            None => self.heads.get(level).copied().flatten(),
            Some(idx) => self.node(idx).next[level],
        }
    }

    fn set_next(&mut self, from: Option<usize>, level: usize, to: Option<usize>) {
        match from {
            None => self.heads[level] = to,
            Some(idx) => self.node_mut(idx).next[level] = to,
        }
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_bool(0.5) {
            height += 1;
        }
        height
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("skip list link to a freed slot")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("skip list link to a freed slot")
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("len", &self.len)
            .field("height", &self.heads.len())
            .field("approx_size", &self.approx_size)
            .finish()
    }
}

/// Walks level 0 in ascending key order.
pub struct Iter<'a> {
    table: &'a Memtable,
    cursor: Option<usize>,
    hi: u64,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (u64, Option<&'a [u8]>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.table.node(idx);
        if node.key > self.hi {
            self.cursor = None;
            return None;
        }
        self.cursor = node.next[0];
        Some((node.key, node.value.as_deref()))
    }
}
