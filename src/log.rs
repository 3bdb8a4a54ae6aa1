//! Log: the rotator that owns a directory of segments.
//!
//! Appends go to the newest (active) segment; once it reports `is_maxed` the
//! log starts a fresh segment at `base_offset = prev.next_offset`. Older
//! segments stay open for reads until the log is closed, truncated, or
//! removed.

use crate::codec::{BincodeCodec, RecordCodec};
use crate::error::LogError;
use crate::segment::{Segment, SegmentConfig};
use crate::telemetry::{log_metrics, noop_event_listener, LogEvent, LogEventListener};
use crate::types::Record;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Configuration options for the log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Capacity limits applied to every segment.
    pub segment: SegmentConfig,
    /// Record wire encoding shared by all segments.
    pub codec: Arc<dyn RecordCodec>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn LogEventListener>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            segment: SegmentConfig::default(),
            codec: Arc::new(BincodeCodec),
            event_listener: noop_event_listener(),
        }
    }
}

/// An append-only commit log backed by rotating segments in one directory.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    state: RwLock<LogState>,
}

#[derive(Debug)]
struct LogState {
    /// Sorted by base offset; the last entry is the active segment.
    segments: Vec<Arc<Segment>>,
}

impl Log {
    /// Opens the log in `dir`, rebuilding segments from the `*.store` files
    /// found there. An empty directory starts a single segment at offset 0.
    pub fn open<P: AsRef<Path>>(dir: P, config: LogConfig) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut base_offsets = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("store") {
                continue;
            }
            if let Some(base) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                base_offsets.push(base);
            }
        }
        base_offsets.sort_unstable();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Arc::new(Segment::new(
                &dir,
                base,
                config.segment.clone(),
                Arc::clone(&config.codec),
            )?));
        }
        if segments.is_empty() {
            segments.push(Arc::new(Segment::new(
                &dir,
                0,
                config.segment.clone(),
                Arc::clone(&config.codec),
            )?));
        }
        log_metrics::set_active_segments(segments.len());

        Ok(Log {
            dir,
            config,
            state: RwLock::new(LogState { segments }),
        })
    }

    /// Appends a record to the active segment, rotating first if the segment
    /// has reached capacity. Returns the stamped absolute offset.
    pub fn append(&self, record: &mut Record) -> Result<u64, LogError> {
        let start = Instant::now();
        let mut state = self.state.write()?;

        let mut active = state
            .segments
            .last()
            .cloned()
            .ok_or(LogError::Closed("log"))?;
        if active.is_maxed() {
            let base = active.next_offset();
            let segment = Arc::new(Segment::new(
                &self.dir,
                base,
                self.config.segment.clone(),
                Arc::clone(&self.config.codec),
            )?);
            state.segments.push(Arc::clone(&segment));
            self.config
                .event_listener
                .on_event(LogEvent::SegmentRotated { base_offset: base });
            log_metrics::set_active_segments(state.segments.len());
            active = segment;
        }

        let offset = active.append(record)?;
        log_metrics::record_append(record.value.len() as u64, start.elapsed());
        Ok(offset)
    }

    /// Reads the record stamped with `offset` from whichever segment covers it.
    pub fn read(&self, offset: u64) -> Result<Record, LogError> {
        let start = Instant::now();
        let segment = {
            let state = self.state.read()?;
            state
                .segments
                .iter()
                .find(|s| s.base_offset() <= offset && offset < s.next_offset())
                .cloned()
                .ok_or(LogError::OffsetOutOfRange { offset })?
        };

        let record = segment.read(offset)?;
        log_metrics::record_read(start.elapsed());
        Ok(record)
    }

    /// Base offset of the oldest segment.
    pub fn lowest_offset(&self) -> Result<u64, LogError> {
        let state = self.state.read()?;
        Ok(state
            .segments
            .first()
            .map(|s| s.base_offset())
            .unwrap_or(0))
    }

    /// Offset of the most recently appended record, or 0 when empty.
    pub fn highest_offset(&self) -> Result<u64, LogError> {
        let state = self.state.read()?;
        let off = state.segments.last().map(|s| s.next_offset()).unwrap_or(0);
        Ok(if off == 0 { 0 } else { off - 1 })
    }

    /// Retires whole segments whose records all lie strictly below `lowest`.
    /// Removal is whole-segment: a segment containing `lowest` (or straddling
    /// it) is kept, so `lowest` itself stays readable.
    pub fn truncate(&self, lowest: u64) -> Result<(), LogError> {
        let mut state = self.state.write()?;

        let segments: Vec<_> = state.segments.drain(..).collect();
        for segment in segments {
            if segment.next_offset() <= lowest {
                let base = segment.base_offset();
                segment.remove()?;
                self.config
                    .event_listener
                    .on_event(LogEvent::SegmentRemoved { base_offset: base });
            } else {
                state.segments.push(segment);
            }
        }

        self.config
            .event_listener
            .on_event(LogEvent::LogTruncated { lowest });
        log_metrics::set_active_segments(state.segments.len());
        Ok(())
    }

    /// Closes every segment, surfacing the first error.
    pub fn close(&self) -> Result<(), LogError> {
        let state = self.state.read()?;
        for segment in &state.segments {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes the log and deletes its directory.
    pub fn remove(&self) -> Result<(), LogError> {
        {
            let mut state = self.state.write()?;
            for segment in state.segments.drain(..) {
                segment.remove()?;
            }
        }
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}
