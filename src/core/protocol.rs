//! Production protocol identifiers.

use std::fmt;

/// How a producer publishes content.
///
/// The numeric values are the ones carried in the manifest `transport_type`
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TransportType {
    /// Not specified.
    Unknown = 0,
    /// Reliable in-order byte stream.
    Bytestream = 1,
    /// Real-time stream with NACKs and producer-driven sequence numbers.
    #[default]
    Rtc = 2,
}

impl TransportType {
    /// Parse a transport type from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Unknown),
            1 => Some(Self::Bytestream),
            2 => Some(Self::Rtc),
            _ => None,
        }
    }

    /// Wire byte of this transport type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Bytestream => "bytestream",
            Self::Rtc => "rtc",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
