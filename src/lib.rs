#![doc = r#"
seglog: Persistent Append-Only Commit Log in Rust

This crate provides a segmented, append-only commit log for Rust applications. Records are appended in order, each assigned a monotonically increasing 64-bit offset, and can be read back by offset. It supports:
- Fixed-size on-disk segments, each a paired store (length-prefixed payloads) and memory-mapped index
- Buffered store writes with flush-before-read visibility
- Automatic segment rotation and whole-segment retirement
- Pluggable record codecs (bincode by default, optional crc32 checksumming)
- Thread-safe architecture

See the README for usage examples and more details.
"#]
// Declare modules
pub mod codec;
pub mod error;
pub mod index;
pub mod log;
pub mod segment;
pub mod store;
pub mod telemetry;
pub mod types;

/// Main entry point: the rotating commit log.
pub use crate::log::Log;
/// Configuration options for the log.
pub use crate::log::LogConfig;
/// Error type for log operations.
pub use crate::error::LogError;
/// A single store+index pair addressable by a contiguous offset range.
pub use crate::segment::Segment;
/// Capacity limits for a single segment.
pub use crate::segment::SegmentConfig;
/// Record wire-encoding seam and the bundled codecs.
pub use crate::codec::{BincodeCodec, ChecksumCodec, PlainCodec, RecordCodec};
/// Structured event hook for observability.
pub use crate::telemetry::{LogEvent, LogEventListener};
/// The unit the log ingests and emits.
pub use crate::types::Record;
/// Type alias for an absolute record offset.
pub use crate::types::Offset;
