///! # Bloom Filter
///!
///! A fixed-size probabilistic membership bitset for `u64` keys.
///!
///! A bloom filter can tell you with certainty that a key is **not** in the set
///! (no false negatives), but may occasionally report that a key **is** in the
///! set when it isn't (false positives).
///!
///! ## Usage in the store
///!
///! Every sorted run embeds one filter of exactly [`BLOOM_BITS`] bits, written
///! verbatim between the run header and its locator array. A key sets the four
///! bits selected by the four 32-bit lanes of its 128-bit hash, each lane taken
///! modulo [`BLOOM_BITS`]. During point lookups the run checks the filter
///! first: any of the four bits reading 0 means the key is absent.
///!
///! ## Example
///!
///! ```rust
///! use bloom::BloomFilter;
///!
///! let mut bf = BloomFilter::new();
///! bf.insert(42);
///! assert!(bf.may_contain(42));
///! ```
use std::io::{self, Read, Write};
use xxhash_rust::xxh3::xxh3_128_with_seed;

/// Number of bits in every filter (64 Ki bits).
pub const BLOOM_BITS: usize = 65536;

/// Serialized size of a filter in bytes (8 KiB).
pub const BLOOM_BYTES: usize = BLOOM_BITS / 8;

/// Seed used when hashing keys into a filter.
pub const BLOOM_SEED: u64 = 1;

/// Hashes `data` to 128 bits and splits the result into four 32-bit lanes,
/// least significant lane first.
#[must_use]
pub fn hash128(data: &[u8], seed: u64) -> [u32; 4] {
    let h = xxh3_128_with_seed(data, seed);
    [
        h as u32,
        (h >> 32) as u32,
        (h >> 64) as u32,
        (h >> 96) as u32,
    ]
}

/// The four bit positions a key occupies in a filter.
#[must_use]
pub fn bit_positions(key: u64) -> [usize; 4] {
    let lanes = hash128(&key.to_le_bytes(), BLOOM_SEED);
    lanes.map(|lane| lane as usize % BLOOM_BITS)
}

/// A fixed-size bloom filter over `u64` keys.
///
/// Bits are stored most-significant-first within each byte: bit `i` lives in
/// byte `i / 8` under mask `0x80 >> (i % 8)`.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Creates an empty filter (all bits clear).
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: vec![0u8; BLOOM_BYTES],
        }
    }

    /// Builds a filter containing every key yielded by `keys`.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let mut bf = Self::new();
        for key in keys {
            bf.insert(key);
        }
        bf
    }

    /// Wraps an existing serialized bitset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if `bytes` is not exactly [`BLOOM_BYTES`] long.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() != BLOOM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "bloom filter must be {} bytes, got {}",
                    BLOOM_BYTES,
                    bytes.len()
                ),
            ));
        }
        Ok(Self {
            bits: bytes.to_vec(),
        })
    }

    /// Inserts a key into the filter.
    pub fn insert(&mut self, key: u64) {
        for idx in bit_positions(key) {
            self.set_bit(idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: u64) -> bool {
        bit_positions(key).into_iter().all(|idx| self.get_bit(idx))
    }

    /// ORs every bit of `other` into `self`.
    pub fn union_with(&mut self, other: &BloomFilter) {
        for (dst, src) in self.bits.iter_mut().zip(&other.bits) {
            *dst |= *src;
        }
    }

    /// Number of set bits. Mostly useful for diagnostics.
    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// The raw serialized bitset.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Writes the raw bitset ([`BLOOM_BYTES`] bytes, no framing).
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.bits)
    }

    /// Reads exactly [`BLOOM_BYTES`] bytes as a filter.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut bits = vec![0u8; BLOOM_BYTES];
        r.read_exact(&mut bits)?;
        Ok(Self { bits })
    }

    fn set_bit(&mut self, idx: usize) {
        self.bits[idx / 8] |= 0x80 >> (idx % 8);
    }

    fn get_bit(&self, idx: usize) -> bool {
        self.bits[idx / 8] & (0x80 >> (idx % 8)) != 0
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &BLOOM_BITS)
            .field("ones", &self.count_ones())
            .finish()
    }
}
