//! Record encoding: the seam between the segment and the wire representation
//! of a record. The store frames whatever bytes the codec produces with a
//! length prefix, so codecs are free to choose any self-contained encoding.

use crate::error::LogError;
use crate::types::Record;

use crc32fast::Hasher as Crc32;

/// Deterministic encode/decode pair for records.
///
/// The decoder always receives exactly the bytes the encoder produced; the
/// store's length prefix provides the framing.
pub trait RecordCodec: std::fmt::Debug + Send + Sync + 'static {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, LogError>;
    fn decode(&self, bytes: &[u8]) -> Result<Record, LogError>;
}

/// Default codec: bincode over the whole record, offset included.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl RecordCodec for BincodeCodec {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, LogError> {
        bincode::serialize(record).map_err(|e| LogError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record, LogError> {
        bincode::deserialize(bytes).map_err(|e| LogError::Codec(e.to_string()))
    }
}

/// Pass-through codec: the encoded form is the payload itself.
///
/// The offset is not carried in the encoded bytes; the segment restores it
/// from the index on read.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl RecordCodec for PlainCodec {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, LogError> {
        Ok(record.value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record, LogError> {
        Ok(Record {
            value: bytes.to_vec(),
            offset: 0,
        })
    }
}

/// Width of the trailing big-endian crc32 appended by [`ChecksumCodec`].
const CRC_WIDTH: usize = 4;

/// Wraps another codec and appends a crc32 of the encoded bytes.
///
/// The checksum lives inside the payload the store frames, so the on-disk
/// format is unchanged: still `[len][payload]`, with the last four payload
/// bytes holding the big-endian crc32 of everything before them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumCodec<C> {
    inner: C,
}

impl<C: RecordCodec> ChecksumCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: RecordCodec> RecordCodec for ChecksumCodec<C> {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, LogError> {
        let mut payload = self.inner.encode(record)?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        payload.extend_from_slice(&hasher.finalize().to_be_bytes());
        Ok(payload)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record, LogError> {
        if bytes.len() < CRC_WIDTH {
            return Err(LogError::Corruption {
                details: format!("payload too short for checksum: {} bytes", bytes.len()),
            });
        }
        let (payload, crc_bytes) = bytes.split_at(bytes.len() - CRC_WIDTH);
        let mut stored = [0u8; CRC_WIDTH];
        stored.copy_from_slice(crc_bytes);
        let stored = u32::from_be_bytes(stored);

        let mut hasher = Crc32::new();
        hasher.update(payload);
        let computed = hasher.finalize();
        if computed != stored {
            return Err(LogError::Corruption {
                details: format!(
                    "checksum mismatch: stored {:#010x}, computed {:#010x}",
                    stored, computed
                ),
            });
        }
        self.inner.decode(payload)
    }
}
