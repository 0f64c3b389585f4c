//! NACK and data payload headers.
//!
//! A producer that cannot serve a segment answers with an 8-byte NACK
//! payload instead of data:
//!
//! ```text
//! +--------------------+--------------------+
//! | Production segment | Production rate    |
//! | 4 bytes (BE32)     | 4 bytes (BE32)     |
//! +--------------------+--------------------+
//! ```
//!
//! A payload of any other length is data. Data payloads start with the
//! producer's 8-byte millisecond timestamp (BE64).

use crate::core::{NACK_HEADER_SIZE, TIMESTAMP_SIZE};

/// NACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackHeader {
    /// Segment the producer is about to produce.
    pub production_segment: u32,
    /// Production rate in bytes per second; zero means the producer is idle.
    pub production_rate: u32,
}

impl NackHeader {
    /// Create a NACK header.
    pub fn new(production_segment: u32, production_rate: u32) -> Self {
        Self {
            production_segment,
            production_rate,
        }
    }

    /// Serialize to the 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; NACK_HEADER_SIZE] {
        let mut buf = [0u8; NACK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.production_segment.to_be_bytes());
        buf[4..8].copy_from_slice(&self.production_rate.to_be_bytes());
        buf
    }

    /// Parse a payload as a NACK.
    ///
    /// Returns `None` unless the payload is exactly [`NACK_HEADER_SIZE`] bytes.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let bytes: &[u8; NACK_HEADER_SIZE] = payload.try_into().ok()?;
        Some(Self {
            production_segment: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            production_rate: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Whether the producer reported itself idle.
    pub fn is_producer_idle(&self) -> bool {
        self.production_rate == 0
    }
}

/// Whether a payload is a NACK.
pub fn is_nack(payload: &[u8]) -> bool {
    payload.len() == NACK_HEADER_SIZE
}

/// Producer timestamp at the start of a data payload.
pub fn data_timestamp(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; TIMESTAMP_SIZE] = payload.get(..TIMESTAMP_SIZE)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Build a data payload: producer timestamp followed by `data`.
pub fn encode_data_payload(timestamp_ms: u64, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(TIMESTAMP_SIZE + data.len());
    payload.extend_from_slice(&timestamp_ms.to_be_bytes());
    payload.extend_from_slice(data);
    payload
}
