//! Sorted-run binary format constants and codec helpers.
//!
//! ```text
//! [time: u64 LE][count: u64 LE][min_key: u64 LE][max_key: u64 LE]   header, 32 bytes
//! [bloom: 8192 bytes]                                                 65536-bit filter
//! [key: u64 LE][offset: u64 LE][vlen: u32 LE] x count                 20 bytes each
//! ```
//!
//! The decoder checks every length against the buffer before touching it.

use bloom::{BloomFilter, BLOOM_BYTES};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Result as IoResult, Write};
use vlog::ValueLocator;

/// Size of the fixed header: time + count + min_key + max_key.
pub const HEADER_BYTES: usize = 8 + 8 + 8 + 8;

/// Size of one locator entry: key + offset + vlen.
pub const ENTRY_BYTES: usize = 8 + 8 + 4;

/// Bytes every run pays before its first entry.
pub const BASE_BYTES: usize = HEADER_BYTES + BLOOM_BYTES;

/// Default page size bounding one run file (16 KiB).
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

/// The fixed-size header at the start of every run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub timestamp: u64,
    pub count: u64,
    pub min_key: u64,
    pub max_key: u64,
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_u64::<LittleEndian>(self.timestamp)?;
        w.write_u64::<LittleEndian>(self.count)?;
        w.write_u64::<LittleEndian>(self.min_key)?;
        w.write_u64::<LittleEndian>(self.max_key)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        Ok(Self {
            timestamp: r.read_u64::<LittleEndian>()?,
            count: r.read_u64::<LittleEndian>()?,
            min_key: r.read_u64::<LittleEndian>()?,
            max_key: r.read_u64::<LittleEndian>()?,
        })
    }
}

/// On-disk size of a run holding `count` entries.
#[must_use]
pub fn encoded_size(count: usize) -> usize {
    BASE_BYTES + count * ENTRY_BYTES
}

/// Largest number of entries whose run stays within `page_size` bytes.
#[must_use]
pub fn max_entries_per_run(page_size: usize) -> usize {
    page_size.saturating_sub(BASE_BYTES) / ENTRY_BYTES
}

pub fn write_entry<W: Write>(w: &mut W, loc: &ValueLocator) -> IoResult<()> {
    w.write_u64::<LittleEndian>(loc.key)?;
    w.write_u64::<LittleEndian>(loc.offset)?;
    w.write_u32::<LittleEndian>(loc.len)?;
    Ok(())
}

pub fn read_entry<R: Read>(r: &mut R) -> IoResult<ValueLocator> {
    let key = r.read_u64::<LittleEndian>()?;
    let offset = r.read_u64::<LittleEndian>()?;
    let len = r.read_u32::<LittleEndian>()?;
    Ok(ValueLocator { key, offset, len })
}

/// Decodes a whole run image into its parts.
///
/// # Errors
///
/// `InvalidData` if the buffer is shorter than the header and filter, if its
/// length disagrees with the header's entry count, or if the entries are not
/// strictly ascending by key.
pub fn decode(bytes: &[u8]) -> IoResult<(Header, BloomFilter, Vec<ValueLocator>)> {
    if bytes.len() < BASE_BYTES {
        return Err(invalid(format!(
            "run image too small: {} bytes (need at least {})",
            bytes.len(),
            BASE_BYTES
        )));
    }
    let mut r = bytes;
    let header = Header::read_from(&mut r)?;

    let count = usize::try_from(header.count)
        .ok()
        .filter(|c| c.checked_mul(ENTRY_BYTES).is_some())
        .ok_or_else(|| invalid(format!("absurd entry count {}", header.count)))?;
    let expected = encoded_size(count);
    if bytes.len() != expected {
        return Err(invalid(format!(
            "run image is {} bytes but header declares {} entries ({} bytes)",
            bytes.len(),
            count,
            expected
        )));
    }

    let bloom = BloomFilter::read_from(&mut r)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let loc = read_entry(&mut r)?;
        if let Some(prev) = entries.last().map(|p: &ValueLocator| p.key) {
            if loc.key <= prev {
                return Err(invalid(format!(
                    "entries out of order: {} after {}",
                    loc.key, prev
                )));
            }
        }
        entries.push(loc);
    }
    Ok((header, bloom, entries))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
