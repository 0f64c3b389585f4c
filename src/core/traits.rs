//! Collaborator traits.
//!
//! The RTC controller does no I/O of its own. It talks to the network through
//! a [`Portal`] and hands delivered bytes to the application through a
//! [`ReadCallback`]. Both are invoked synchronously from the controller's
//! event loop and must not call back into the controller.

use std::time::Duration;

use super::name::Name;

/// A named request for one content segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    /// Requested name; the suffix is the segment number.
    pub name: Name,
    /// How long the network keeps the request pending.
    pub lifetime: Duration,
}

impl Interest {
    /// Create an Interest.
    pub fn new(name: Name, lifetime: Duration) -> Self {
        Self { name, lifetime }
    }

    /// Segment number carried in the name suffix.
    pub fn suffix(&self) -> u32 {
        self.name.suffix()
    }
}

/// A named response: data or NACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    /// Name of the satisfied Interest.
    pub name: Name,
    /// Label of the forwarding path the packet took.
    pub path_label: u32,
    /// Payload bytes. Data payloads start with an 8-byte producer timestamp.
    pub payload: Vec<u8>,
}

impl ContentObject {
    /// Create a content object.
    pub fn new(name: Name, path_label: u32, payload: Vec<u8>) -> Self {
        Self {
            name,
            path_label,
            payload,
        }
    }

    /// Segment number carried in the name suffix.
    pub fn suffix(&self) -> u32 {
        self.name.suffix()
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Network side of a consumer: sends Interests and tracks which are pending.
///
/// Responses and expirations are fed back to the controller by whoever owns
/// the portal (see `RtcSession`).
pub trait Portal {
    /// Send an Interest.
    fn send_interest(&mut self, interest: Interest);

    /// Whether an Interest for `name` is still pending in the portal.
    fn is_interest_pending(&self, name: &Name) -> bool;
}

/// Application side of a consumer: receives delivered payload bytes.
///
/// Two delivery modes exist. A movable callback takes ownership of each
/// payload. A copying callback lends buffers that the payload is copied into,
/// then is told how many bytes were written.
pub trait ReadCallback {
    /// Whether payloads are handed over by value.
    fn is_buffer_movable(&self) -> bool;

    /// Receive a payload by value (movable mode).
    fn read_buffer_available(&mut self, buffer: Vec<u8>);

    /// Lend a buffer to copy into (copy mode).
    ///
    /// `None` or an empty slice is a fatal application error.
    fn get_read_buffer(&mut self) -> Option<&mut [u8]>;

    /// `len` bytes were copied into lent buffers (copy mode).
    fn read_data_available(&mut self, len: usize);
}
