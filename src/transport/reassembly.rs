//! Delivery of received payloads to the application.

use tracing::trace;

use crate::core::{ReadCallback, TIMESTAMP_SIZE};

use super::error::RtcError;

/// Sink for payloads accepted by the controller.
///
/// Called synchronously from the controller's event loop; implementations
/// must not block.
pub trait Reassembly {
    /// Take ownership of the payload of segment `suffix`.
    fn reassemble(&mut self, payload: Vec<u8>, suffix: u32) -> Result<(), RtcError>;
}

/// Reassembly for real-time streams: no reordering, every segment is handed
/// to the application as soon as it arrives, minus the producer timestamp.
#[derive(Default)]
pub struct RtcReassembly {
    read_callback: Option<Box<dyn ReadCallback + Send>>,
}

impl std::fmt::Debug for RtcReassembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcReassembly")
            .field("read_callback", &self.read_callback.is_some())
            .finish()
    }
}

impl RtcReassembly {
    /// Create a sink with no read callback installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink delivering to `callback`.
    pub fn with_callback(callback: Box<dyn ReadCallback + Send>) -> Self {
        Self {
            read_callback: Some(callback),
        }
    }

    /// Install or replace the read callback.
    pub fn set_read_callback(&mut self, callback: Box<dyn ReadCallback + Send>) {
        self.read_callback = Some(callback);
    }

    /// Remove the read callback.
    pub fn take_read_callback(&mut self) -> Option<Box<dyn ReadCallback + Send>> {
        self.read_callback.take()
    }
}

impl Reassembly for RtcReassembly {
    fn reassemble(&mut self, mut payload: Vec<u8>, suffix: u32) -> Result<(), RtcError> {
        let callback = self
            .read_callback
            .as_mut()
            .ok_or(RtcError::ReadCallbackNotInstalled)?;

        payload.drain(..TIMESTAMP_SIZE.min(payload.len()));
        trace!(suffix, len = payload.len(), "delivering segment");

        if callback.is_buffer_movable() {
            callback.read_buffer_available(payload);
            return Ok(());
        }

        let total = payload.len();
        let mut remaining = payload.as_slice();
        while !remaining.is_empty() {
            let buffer = match callback.get_read_buffer() {
                Some(buffer) if !buffer.is_empty() => buffer,
                _ => return Err(RtcError::InvalidReadBuffer),
            };
            let n = remaining.len().min(buffer.len());
            buffer[..n].copy_from_slice(&remaining[..n]);
            remaining = &remaining[n..];
        }
        callback.read_data_available(total);
        Ok(())
    }
}
