//! Filesystem helpers for space reclamation.
//!
//! On Linux the reclaimed range is hole-punched (`fallocate` with
//! `FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE`) so the file keeps its size
//! and offsets stay valid while the blocks go back to the filesystem. Where
//! that is unavailable the range is overwritten with zeros instead, which
//! keeps the same read semantics without freeing space.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// Releases the bytes `[offset, offset + len)` of the file at `path`.
pub fn deallocate_range(path: &Path, offset: u64, len: u64) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    let file = OpenOptions::new().write(true).open(path)?;

    #[cfg(target_os = "linux")]
    {
        match punch_hole(&file, offset, len) {
            Ok(()) => return Ok(()),
            Err(e) => log::debug!(
                "hole punch unsupported for {} ({}), zero-filling instead",
                path.display(),
                e
            ),
        }
    }

    zero_fill(file, offset, len)
}

/// Offset of the first byte at or after 0 that is backed by data, or `len`
/// when the whole file is a hole. Conservative: returns 0 when the platform
/// cannot tell.
pub fn first_data_offset(path: &Path, len: u64) -> io::Result<u64> {
    if len == 0 {
        return Ok(0);
    }

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let file = File::open(path)?;
        let pos = unsafe { libc::lseek(file.as_raw_fd(), 0, libc::SEEK_DATA) };
        if pos >= 0 {
            return Ok((pos as u64).min(len));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENXIO) {
            return Ok(len);
        }
        log::debug!("SEEK_DATA failed on {}: {}", path.display(), err);
    }

    #[cfg(not(target_os = "linux"))]
    let _ = path;

    Ok(0)
}

#[cfg(target_os = "linux")]
fn punch_hole(file: &File, offset: u64, len: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe {
        libc::fallocate(
            file.as_raw_fd(),
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            len as libc::off_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn zero_fill(mut file: File, offset: u64, len: u64) -> io::Result<()> {
    const CHUNK: u64 = 64 * 1024;
    let zeros = vec![0u8; CHUNK as usize];
    file.seek(SeekFrom::Start(offset))?;
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK);
        file.write_all(&zeros[..n as usize])?;
        remaining -= n;
    }
    file.flush()?;
    file.sync_data()
}
