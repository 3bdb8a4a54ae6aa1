//! Segment: one store and one index composed under a shared base offset.
//!
//! The segment translates between absolute log offsets and index-relative
//! offsets, runs records through the codec, and routes bytes to the store
//! while keeping the index in step. A per-segment mutex makes offset
//! stamping, the store append, the index write, and the `next_offset` advance
//! atomic with respect to other callers.

use crate::codec::RecordCodec;
use crate::error::LogError;
use crate::index::Index;
use crate::store::Store;
use crate::types::Record;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Capacity limits for a single segment.
///
/// `max_index_bytes` is the authoritative cap: it bounds the memory map, and
/// exceeding it surfaces as `EndOfFile` from the index write.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub max_store_bytes: u64,
    pub max_index_bytes: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
        }
    }
}

#[derive(Debug)]
pub struct Segment {
    base_offset: u64,
    store: Store,
    state: Mutex<SegmentState>,
    store_path: PathBuf,
    index_path: PathBuf,
    config: SegmentConfig,
    codec: Arc<dyn RecordCodec>,
}

#[derive(Debug)]
struct SegmentState {
    index: Index,
    /// Absolute offset the next append will be stamped with.
    next_offset: u64,
}

impl Segment {
    /// Opens (or creates) `<base_offset>.store` and `<base_offset>.index`
    /// inside `dir` and derives `next_offset` from the last index entry.
    pub fn new<P: AsRef<Path>>(
        dir: P,
        base_offset: u64,
        config: SegmentConfig,
        codec: Arc<dyn RecordCodec>,
    ) -> Result<Self, LogError> {
        let dir = dir.as_ref();
        let store_path = dir.join(format!("{}.store", base_offset));
        let index_path = dir.join(format!("{}.index", base_offset));

        let store = Store::new(&store_path)?;
        let index = Index::new(&index_path, config.max_index_bytes)?;

        let next_offset = match index.read(-1) {
            Ok((off, _)) => base_offset + off as u64 + 1,
            Err(LogError::EndOfFile) => base_offset,
            Err(e) => return Err(e),
        };

        Ok(Segment {
            base_offset,
            store,
            state: Mutex::new(SegmentState { index, next_offset }),
            store_path,
            index_path,
            config,
            codec,
        })
    }

    /// Appends a record, stamping it with the segment's next offset.
    /// Returns the stamped absolute offset.
    ///
    /// `next_offset` only advances once both the store append and the index
    /// write have succeeded; a failed index write leaves an unreferenced tail
    /// in the store that the index (the authority on recovery) never points
    /// at.
    pub fn append(&self, record: &mut Record) -> Result<u64, LogError> {
        let mut state = self.state.lock()?;

        let cur = state.next_offset;
        record.offset = cur;

        let encoded = self.codec.encode(record)?;
        let (_, pos) = self.store.append(&encoded)?;
        state.index.write((cur - self.base_offset) as u32, pos)?;

        state.next_offset += 1;
        Ok(cur)
    }

    /// Reads the record stamped with `offset`.
    pub fn read(&self, offset: u64) -> Result<Record, LogError> {
        let rel = offset
            .checked_sub(self.base_offset)
            .ok_or(LogError::EndOfFile)?;

        let (_, pos) = self.state.lock()?.index.read(rel as i64)?;
        let bytes = self.store.read(pos)?;

        let mut record = self.codec.decode(&bytes)?;
        record.offset = offset;
        Ok(record)
    }

    /// True once either component has reached its configured capacity. The
    /// rotator uses this to close the active segment and start the next one
    /// at `base_offset = next_offset`.
    pub fn is_maxed(&self) -> bool {
        let index_full = self
            .state
            .lock()
            .map(|s| s.index.size() >= self.config.max_index_bytes)
            .unwrap_or(true);
        self.store.size() >= self.config.max_store_bytes || index_full
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Absolute offset the next append would receive; also one past the last
    /// readable offset.
    pub fn next_offset(&self) -> u64 {
        self.state
            .lock()
            .map(|s| s.next_offset)
            .unwrap_or(self.base_offset)
    }

    /// Closes index then store, surfacing the first error.
    pub fn close(&self) -> Result<(), LogError> {
        let mut state = self.state.lock()?;
        state.index.close()?;
        self.store.close()
    }

    /// Closes the segment and unlinks both files.
    pub fn remove(&self) -> Result<(), LogError> {
        self.close()?;
        fs::remove_file(&self.index_path)?;
        fs::remove_file(&self.store_path)?;
        Ok(())
    }
}

/// Largest multiple of `k` not exceeding `j`. The rotator uses this to align
/// base offsets to a configured granularity.
pub fn nearest_multiple(j: u64, k: u64) -> u64 {
    (j / k) * k
}
