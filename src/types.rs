use serde::{Deserialize, Serialize};

/// Absolute offset of a record within the log (stamped by the segment at append time).
pub type Offset = u64;

/// A single record as ingested and emitted by the log.
///
/// The payload is opaque to the storage layer; `offset` is assigned by the
/// owning segment when the record is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: Vec<u8>,
    pub offset: Offset,
}

impl Record {
    /// Creates a record with the given payload and an unassigned offset.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Record {
            value: value.into(),
            offset: 0,
        }
    }
}
