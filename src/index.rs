//! Index: memory-mapped file of fixed-width entries mapping a segment-relative
//! offset to a byte position in the store file.
//!
//! The file is grown to its configured maximum before mapping because a memory
//! map's size is fixed at creation. On close the file is truncated back to the
//! logical size so the last entry sits at the end of the file and a reopen can
//! rediscover the entry count from `stat` alone.
//!
//! The index is not internally synchronized; it is owned by exactly one
//! segment, which serializes writes against reads.

use crate::error::LogError;

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Width of the big-endian u32 relative-offset field.
pub const OFF_WIDTH: u64 = 4;
/// Width of the big-endian u64 store-position field.
pub const POS_WIDTH: u64 = 8;
/// Width of a whole index entry.
pub const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// Dense array of `[u32 BE relative_offset][u64 BE position]` entries.
#[derive(Debug)]
pub struct Index {
    file: Option<File>,
    mmap: Option<MmapMut>,
    /// Logical length in bytes; the mapped region beyond it is zero padding.
    size: u64,
}

impl Index {
    /// Opens (or creates) the index file, records its current size, grows it
    /// to `max_index_bytes`, and memory-maps it read/write shared.
    pub fn new<P: AsRef<Path>>(path: P, max_index_bytes: u64) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;

        // SAFETY: the file stays open for the lifetime of the map and the data
        // directory is exclusive to this process; all accesses are bounds
        // checked against the mapped length.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Index {
            file: Some(file),
            mmap: Some(mmap),
            size,
        })
    }

    /// Appends an entry. Fails with `EndOfFile` when the mapped region has no
    /// room for another entry.
    pub fn write(&mut self, off: u32, pos: u64) -> Result<(), LogError> {
        let mmap = self.mmap.as_mut().ok_or(LogError::Closed("index"))?;
        if (mmap.len() as u64) < self.size + ENT_WIDTH {
            return Err(LogError::EndOfFile);
        }

        let at = self.size as usize;
        mmap[at..at + OFF_WIDTH as usize].copy_from_slice(&off.to_be_bytes());
        mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize].copy_from_slice(&pos.to_be_bytes());
        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Reads the `n`-th entry; `n == -1` reads the last entry. Fails with
    /// `EndOfFile` when the index is empty or `n` lies outside the logical
    /// entry range.
    pub fn read(&self, n: i64) -> Result<(u32, u64), LogError> {
        let mmap = self.mmap.as_ref().ok_or(LogError::Closed("index"))?;
        if self.size == 0 {
            return Err(LogError::EndOfFile);
        }

        let nth = match n {
            // A file shorter than one entry (torn write) has no last entry.
            -1 => (self.size / ENT_WIDTH)
                .checked_sub(1)
                .ok_or(LogError::EndOfFile)?,
            n if n < 0 => return Err(LogError::EndOfFile),
            n => n as u64,
        };

        let at = nth * ENT_WIDTH;
        if self.size < at + ENT_WIDTH {
            return Err(LogError::EndOfFile);
        }

        let at = at as usize;
        let mut off_buf = [0u8; OFF_WIDTH as usize];
        off_buf.copy_from_slice(&mmap[at..at + OFF_WIDTH as usize]);
        let mut pos_buf = [0u8; POS_WIDTH as usize];
        pos_buf.copy_from_slice(&mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize]);

        Ok((u32::from_be_bytes(off_buf), u64::from_be_bytes(pos_buf)))
    }

    /// Logical length in bytes (`entries * ENT_WIDTH`).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Syncs the map and the file, truncates the file back to the logical
    /// size, and closes it. Subsequent operations fail with `Closed`.
    pub fn close(&mut self) -> Result<(), LogError> {
        let (mmap, file) = match (self.mmap.take(), self.file.take()) {
            (Some(m), Some(f)) => (m, f),
            _ => return Ok(()),
        };

        // A failed msync here could silently discard the tail, so surface it
        // before touching the file length.
        mmap.flush()?;
        file.sync_all()?;

        // Unmap before truncating.
        drop(mmap);
        file.set_len(self.size)?;
        Ok(())
    }
}
