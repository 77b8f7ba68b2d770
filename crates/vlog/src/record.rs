//! Value-log record codec.
//!
//! ```text
//! [magic: u8 = 0xFF][checksum: u16 LE][key: u64 LE][vlen: u32 LE][payload: vlen bytes][terminator: u8 = 0]
//! ```
//!
//! The checksum covers `key || vlen || payload` (all little-endian).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

/// First byte of every record.
pub const MAGIC: u8 = 0xFF;

/// Trailing byte of every record.
pub const TERMINATOR: u8 = 0;

/// Bytes before the payload: magic(1) + checksum(2) + key(8) + vlen(4).
pub const RECORD_PREFIX: u64 = 1 + 2 + 8 + 4;

/// Largest payload a single record may carry (64 MiB).
pub const MAX_VALUE_BYTES: u32 = 64 * 1024 * 1024;

/// 16-bit checksum: CRC-32 folded by XOR-ing its two halves.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    let crc = hasher.finalize();
    ((crc >> 16) as u16) ^ (crc as u16)
}

/// Checksum stored in a record for `key` and `payload`.
#[must_use]
pub fn record_checksum(key: u64, payload: &[u8]) -> u16 {
    let mut body = Vec::with_capacity(12 + payload.len());
    body.extend_from_slice(&key.to_le_bytes());
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload);
    crc16(&body)
}

/// Total on-disk size of a record carrying `vlen` payload bytes.
#[must_use]
pub fn encoded_len(vlen: u32) -> u64 {
    RECORD_PREFIX + vlen as u64 + 1
}

/// A decoded record together with the offset it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlogRecord {
    pub offset: u64,
    pub key: u64,
    pub value: Vec<u8>,
}

impl VlogRecord {
    /// On-disk size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        encoded_len(self.value.len() as u32)
    }

    /// Offset of the byte right after this record.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.encoded_len()
    }
}

/// Appends one encoded record to `buf`.
pub fn encode_into(buf: &mut Vec<u8>, key: u64, payload: &[u8]) -> io::Result<()> {
    if payload.is_empty() || payload.len() > MAX_VALUE_BYTES as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "value-log payload for key {} must be 1..={} bytes, got {}",
                key,
                MAX_VALUE_BYTES,
                payload.len()
            ),
        ));
    }
    buf.write_u8(MAGIC)?;
    buf.write_u16::<LittleEndian>(record_checksum(key, payload))?;
    buf.write_u64::<LittleEndian>(key)?;
    buf.write_u32::<LittleEndian>(payload.len() as u32)?;
    buf.extend_from_slice(payload);
    buf.write_u8(TERMINATOR)?;
    Ok(())
}

/// Decodes a record from `r`, positioned at its magic byte.
///
/// `limit` is the number of bytes available from the record start; a record
/// claiming to extend past it is rejected. Returns `Ok(None)` when the bytes
/// do not form a valid record (wrong magic, oversized length, checksum
/// mismatch). Only genuine I/O failures are errors.
pub fn decode_at<R: Read>(r: &mut R, offset: u64, limit: u64) -> io::Result<Option<VlogRecord>> {
    if limit < RECORD_PREFIX + 1 {
        return Ok(None);
    }
    let magic = r.read_u8()?;
    if magic != MAGIC {
        return Ok(None);
    }
    let checksum = r.read_u16::<LittleEndian>()?;
    let key = r.read_u64::<LittleEndian>()?;
    let vlen = r.read_u32::<LittleEndian>()?;
    if vlen == 0 || vlen > MAX_VALUE_BYTES || encoded_len(vlen) > limit {
        return Ok(None);
    }
    let mut value = vec![0u8; vlen as usize];
    r.read_exact(&mut value)?;
    if record_checksum(key, &value) != checksum {
        return Ok(None);
    }
    Ok(Some(VlogRecord { offset, key, value }))
}
