//! # vLog - Append-Only Value Log
//!
//! Holds the actual value payloads of the store. Sorted runs only keep
//! `(key, offset, length)` locators pointing into this file.
//!
//! ## Binary Record Format
//!
//! ```text
//! [magic: u8 = 0xFF][checksum: u16 LE][key: u64 LE][vlen: u32 LE][payload][terminator: u8]
//! ```
//!
//! The 16-bit checksum covers `key || vlen || payload`.
//!
//! ## Head and tail
//!
//! The valid byte range is `[tail, head)`. `head` is the file size (the next
//! append offset). `tail` is the first offset holding a magic byte followed
//! by a record whose checksum verifies; it is found by scanning forward, so a
//! torn or partially reclaimed prefix is skipped rather than treated as an
//! error. Reclamation releases `[tail, tail + n)` and re-derives the tail.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vlog::ValueLog;
//!
//! let mut log = ValueLog::open("vlog", false).unwrap();
//! let locs = log.append([(1u64, Some(&b"hello"[..])), (2, None)]).unwrap();
//! assert_eq!(log.read(locs[0].offset, locs[0].len).unwrap(), b"hello");
//! assert!(locs[1].is_tombstone());
//! ```

pub mod fs_util;
mod record;

pub use record::{
    crc16, encoded_len, record_checksum, VlogRecord, MAGIC, MAX_VALUE_BYTES, RECORD_PREFIX,
    TERMINATOR,
};

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Where a key's payload lives in the value log.
///
/// `len == 0` marks a tombstone: no record exists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueLocator {
    pub key: u64,
    pub offset: u64,
    pub len: u32,
}

impl ValueLocator {
    pub fn new(key: u64, offset: u64, len: u32) -> Self {
        Self { key, offset, len }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.len == 0
    }
}

/// Errors that can occur during value-log operations.
#[derive(Debug, Error)]
pub enum VlogError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The requested offset lies before the tail and has been reclaimed.
    #[error("offset {offset} already reclaimed (tail = {tail})")]
    Reclaimed { offset: u64, tail: u64 },

    /// The requested record would extend past the head.
    #[error("read of {len} bytes at offset {offset} exceeds head {head}")]
    OutOfRange { offset: u64, len: u32, head: u64 },

    /// No valid record starts at the given offset.
    #[error("no valid record at offset {0}")]
    Corrupt(u64),
}

/// Size of the window read at a time while scanning for the tail.
const SCAN_CHUNK: usize = 64 * 1024;

/// The append-only value log file plus its `[tail, head)` bookkeeping.
pub struct ValueLog {
    path: PathBuf,
    /// Append-mode handle; also used for positioned reads.
    file: File,
    head: u64,
    tail: u64,
    sync: bool,
    /// Reusable scratch buffer for appends.
    buf: Vec<u8>,
}

impl ValueLog {
    /// Opens (or creates) the value log at `path` and recovers head and tail.
    ///
    /// When `sync` is true every append is followed by `fsync`.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, VlogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = Self::open_file(&path)?;
        let mut log = Self {
            path,
            file,
            head: 0,
            tail: 0,
            sync,
            buf: Vec::with_capacity(4096),
        };
        log.recover_tail_head()?;
        Ok(log)
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
    }

    /// Re-derives `head` (file size) and `tail` (first valid record at or
    /// after the first data-backed offset).
    pub fn recover_tail_head(&mut self) -> Result<(), VlogError> {
        self.head = self.file.metadata()?.len();
        let start = fs_util::first_data_offset(&self.path, self.head)?;
        self.tail = self.find_tail_from(start)?;
        log::debug!(
            "vlog {} recovered: tail={} head={}",
            self.path.display(),
            self.tail,
            self.head
        );
        Ok(())
    }

    /// Appends one record per live entry and returns a locator per entry.
    ///
    /// Tombstones (`None`) write nothing and get a locator with `len == 0`
    /// pointing at the head at that moment.
    pub fn append<'a, I>(&mut self, entries: I) -> Result<Vec<ValueLocator>, VlogError>
    where
        I: IntoIterator<Item = (u64, Option<&'a [u8]>)>,
    {
        self.buf.clear();
        let mut locators = Vec::new();
        let mut offset = self.head;

        for (key, value) in entries {
            match value {
                Some(payload) => {
                    record::encode_into(&mut self.buf, key, payload)?;
                    locators.push(ValueLocator::new(key, offset, payload.len() as u32));
                    offset += encoded_len(payload.len() as u32);
                }
                None => locators.push(ValueLocator::new(key, offset, 0)),
            }
        }

        if !self.buf.is_empty() {
            if let Err(e) = self.write_buffered() {
                self.discard_torn_tail();
                return Err(e.into());
            }
        }
        self.head = offset;
        Ok(locators)
    }

    fn write_buffered(&mut self) -> io::Result<()> {
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Drops bytes a failed append left past `head`, so the next append
    /// starts exactly where its locators say it does. If the file cannot be
    /// truncated, `head` follows the file length instead.
    fn discard_torn_tail(&mut self) {
        let len = match self.file.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                log::warn!("vlog {}: cannot stat after failed append: {}", self.path.display(), e);
                return;
            }
        };
        if len <= self.head {
            return;
        }
        match self.file.set_len(self.head) {
            Ok(()) => log::warn!(
                "vlog {}: dropped {} torn bytes after failed append",
                self.path.display(),
                len - self.head
            ),
            Err(e) => {
                log::warn!(
                    "vlog {}: cannot truncate torn append ({}), head moves to {}",
                    self.path.display(),
                    e,
                    len
                );
                self.head = len;
            }
        }
    }

    /// Reads the `len`-byte payload of the record starting at `offset`.
    pub fn read(&mut self, offset: u64, len: u32) -> Result<Vec<u8>, VlogError> {
        if offset < self.tail {
            return Err(VlogError::Reclaimed {
                offset,
                tail: self.tail,
            });
        }
        if offset + encoded_len(len) > self.head {
            return Err(VlogError::OutOfRange {
                offset,
                len,
                head: self.head,
            });
        }
        self.file.seek(SeekFrom::Start(offset + RECORD_PREFIX))?;
        let mut value = vec![0u8; len as usize];
        self.file.read_exact(&mut value)?;
        Ok(value)
    }

    /// Decodes and verifies the record starting exactly at `offset`.
    pub fn read_record(&mut self, offset: u64) -> Result<VlogRecord, VlogError> {
        if offset < self.tail {
            return Err(VlogError::Reclaimed {
                offset,
                tail: self.tail,
            });
        }
        self.probe(offset)?.ok_or(VlogError::Corrupt(offset))
    }

    /// Returns the first valid record starting at or after `from` and below
    /// the head, skipping bytes that do not form a verified record.
    pub fn next_record(&mut self, from: u64) -> Result<Option<VlogRecord>, VlogError> {
        let start = from.max(self.tail);
        // Callers usually pass a record boundary.
        if let Some(record) = self.probe(start)? {
            return Ok(Some(record));
        }
        let pos = self.find_tail_from(start)?;
        if pos >= self.head {
            return Ok(None);
        }
        Ok(self.probe(pos)?)
    }

    /// Releases `[tail, tail + len)` and re-derives the tail.
    pub fn reclaim(&mut self, tail: u64, len: u64) -> Result<(), VlogError> {
        let len = len.min(self.head.saturating_sub(tail));
        fs_util::deallocate_range(&self.path, tail, len)?;
        self.head = self.file.metadata()?.len();
        // Everything below the reclaimed range is already gone, so the scan
        // can start right after it.
        let start = fs_util::first_data_offset(&self.path, self.head)?.max(tail + len);
        self.tail = self.find_tail_from(start)?;
        log::info!(
            "vlog reclaimed {} bytes at {}: tail={} head={}",
            len,
            tail,
            self.tail,
            self.head
        );
        Ok(())
    }

    /// Deletes the backing file and starts over with an empty log.
    pub fn reset(&mut self) -> Result<(), VlogError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.file = Self::open_file(&self.path)?;
        self.head = 0;
        self.tail = 0;
        Ok(())
    }

    /// Forces buffered data to disk.
    pub fn sync_to_disk(&mut self) -> Result<(), VlogError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    #[must_use]
    pub fn head(&self) -> u64 {
        self.head
    }

    #[must_use]
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Bytes between tail and head.
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.head - self.tail
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- Internal helpers ----

    /// Tries to decode a verified record at exactly `pos`.
    fn probe(&mut self, pos: u64) -> io::Result<Option<VlogRecord>> {
        if pos >= self.head {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(pos))?;
        let limit = self.head - pos;
        let mut reader = BufReader::new(Read::by_ref(&mut self.file).take(limit));
        match record::decode_at(&mut reader, pos, limit) {
            Ok(rec) => Ok(rec),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Scans forward from `start` for the first magic byte that begins a
    /// verified record. Returns `head` if none is found.
    fn find_tail_from(&mut self, start: u64) -> io::Result<u64> {
        let mut window = vec![0u8; SCAN_CHUNK];
        let mut cursor = start;

        while cursor < self.head {
            let want = ((self.head - cursor) as usize).min(SCAN_CHUNK);
            self.file.seek(SeekFrom::Start(cursor))?;
            self.file.read_exact(&mut window[..want])?;

            let candidates: Vec<u64> = window[..want]
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == MAGIC)
                .map(|(i, _)| cursor + i as u64)
                .collect();
            for pos in candidates {
                if self.probe(pos)?.is_some() {
                    return Ok(pos);
                }
            }
            cursor += want as u64;
        }
        Ok(self.head)
    }
}

impl std::fmt::Debug for ValueLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueLog")
            .field("path", &self.path)
            .field("tail", &self.tail)
            .field("head", &self.head)
            .field("sync", &self.sync)
            .finish()
    }
}

#[cfg(test)]
mod tests;
