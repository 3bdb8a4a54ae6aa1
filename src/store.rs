//! Store: the raw byte file holding length-prefixed record payloads.
//!
//! Appends go through a buffered writer to amortize syscalls; any read flushes
//! the buffer first so recently appended entries are visible. A single mutex
//! spans the flush and the file I/O, so a reader never observes a half-visible
//! record.

use crate::error::LogError;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Width of the big-endian u64 length prefix preceding every store entry.
pub const LEN_WIDTH: u64 = 8;

/// Append-only file of `[u64 BE length][payload]` entries.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<Option<StoreInner>>,
}

#[derive(Debug)]
struct StoreInner {
    /// Read handle; positioned with seek before every read.
    file: File,
    /// Buffered append handle over a clone of the same descriptor.
    writer: BufWriter<File>,
    /// Logical size: authoritative position for the next append. The on-disk
    /// size may lag by whatever is still buffered.
    size: u64,
}

impl Store {
    /// Opens (or creates) the store file in read/append mode and records its
    /// current size from the filesystem.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(path)?;
        let size = file.metadata()?.len();
        let writer = BufWriter::new(file.try_clone()?);

        Ok(Store {
            inner: Mutex::new(Some(StoreInner { file, writer, size })),
        })
    }

    /// Appends a length-prefixed entry. Returns the total bytes written
    /// (payload plus prefix) and the position the entry starts at, which
    /// equals the store's size before the write.
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64), LogError> {
        let mut guard = self.inner.lock()?;
        let inner = guard.as_mut().ok_or(LogError::Closed("store"))?;

        let pos = inner.size;
        inner.writer.write_all(&(p.len() as u64).to_be_bytes())?;
        inner.writer.write_all(p)?;

        let written = p.len() as u64 + LEN_WIDTH;
        inner.size += written;
        Ok((written, pos))
    }

    /// Reads the entry starting at `pos`: length prefix first, then exactly
    /// that many payload bytes.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>, LogError> {
        let mut guard = self.inner.lock()?;
        let inner = guard.as_mut().ok_or(LogError::Closed("store"))?;

        // Buffered appends must reach the file before a positioned read can
        // see them.
        inner.writer.flush()?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner.file.seek(SeekFrom::Start(pos))?;
        inner.file.read_exact(&mut len_buf)?;

        let mut payload = vec![0u8; u64::from_be_bytes(len_buf) as usize];
        inner.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Raw positioned read for callers that frame differently. Fills `buf`
    /// starting at byte offset `off` and returns the number of bytes read.
    pub fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize, LogError> {
        let mut guard = self.inner.lock()?;
        let inner = guard.as_mut().ok_or(LogError::Closed("store"))?;

        inner.writer.flush()?;
        inner.file.seek(SeekFrom::Start(off))?;
        inner.file.read_exact(buf)?;
        Ok(buf.len())
    }

    /// Logical size in bytes (the next append position).
    pub fn size(&self) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|inner| inner.size))
            .unwrap_or(0)
    }

    /// Flushes buffered data, syncs it to disk, and closes the file.
    /// Subsequent operations fail with `Closed`. Idempotent.
    pub fn close(&self) -> Result<(), LogError> {
        let mut guard = self.inner.lock()?;
        if let Some(mut inner) = guard.take() {
            inner.writer.flush()?;
            inner.writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}
