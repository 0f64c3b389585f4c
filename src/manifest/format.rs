//! Fixed manifest wire format.
//!
//! ```text
//! Meta (4 bytes)
//! +0   Version (low 4 bits) | Type (high 4 bits)
//! +1   Transport type
//! +2   Hash algorithm
//! +3   Is last
//!
//! Entry meta (20 bytes)
//! +4   Entry count (1 byte)
//! +5   Is IPv6 (1 byte)
//! +6   Unused (2 bytes)
//! +8   Prefix (4 x BE32; IPv4 in the first word)
//!
//! Transport parameters (variant selected by the transport type)
//!      Bytestream (4 bytes): final segment (BE32)
//!      RTC (20 bytes): timestamp (BE64) | production rate (BE32)
//!                      | current segment (BE32) | support FEC (BE32)
//!      Unknown: empty
//!
//! Entries (36 bytes each)
//!      Suffix (BE32) | digest (32 bytes)
//! ```

use std::fmt;

use crate::core::TransportType;

use super::error::{ManifestError, ManifestResult};

/// Wire sizes.
pub mod sizes {
    /// Meta block.
    pub const META_SIZE: usize = 4;
    /// Entry meta block.
    pub const ENTRY_META_SIZE: usize = 20;
    /// Bytestream parameter block.
    pub const PARAMS_BYTESTREAM_SIZE: usize = 4;
    /// RTC parameter block.
    pub const PARAMS_RTC_SIZE: usize = 20;
    /// One entry: suffix plus digest.
    pub const ENTRY_SIZE: usize = 36;
    /// Digest width inside an entry.
    pub const DIGEST_SIZE: usize = 32;
    /// Largest count the one-byte entry count can hold.
    pub const MAX_ENTRIES: usize = u8::MAX as usize;
}

use sizes::*;

/// Manifest wire format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ManifestVersion {
    /// Fixed-layout format.
    #[default]
    Fixed = 1,
}

impl ManifestVersion {
    /// Parse the version nibble.
    pub fn from_nibble(nibble: u8) -> ManifestResult<Self> {
        match nibble {
            1 => Ok(Self::Fixed),
            other => Err(ManifestError::UnsupportedVersion(other)),
        }
    }
}

/// What a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ManifestType {
    /// Digests of the segments that follow.
    #[default]
    Inline = 1,
    /// Final chunk number announcement.
    FinalChunkNumber = 2,
    /// File-like manifest.
    Flic = 3,
}

impl ManifestType {
    /// Parse the type nibble.
    pub fn from_nibble(nibble: u8) -> ManifestResult<Self> {
        match nibble {
            1 => Ok(Self::Inline),
            2 => Ok(Self::FinalChunkNumber),
            3 => Ok(Self::Flic),
            other => Err(ManifestError::UnknownManifestType(other)),
        }
    }
}

/// Digest algorithm of the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum HashAlgorithm {
    /// Not specified.
    Unknown = 0,
    /// SHA-256.
    #[default]
    Sha256 = 1,
    /// SHA-512, truncated to the entry width.
    Sha512 = 2,
    /// BLAKE2b-512, truncated to the entry width.
    Blake2b512 = 3,
    /// BLAKE2s-256.
    Blake2s256 = 4,
}

impl HashAlgorithm {
    /// Parse the wire byte.
    pub fn from_byte(byte: u8) -> ManifestResult<Self> {
        match byte {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Sha256),
            2 => Ok(Self::Sha512),
            3 => Ok(Self::Blake2b512),
            4 => Ok(Self::Blake2s256),
            other => Err(ManifestError::UnknownHashAlgorithm(other)),
        }
    }

    /// Wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Native output size in bytes, 0 for `Unknown`.
    pub fn output_size(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Sha256 | Self::Blake2s256 => 32,
            Self::Sha512 | Self::Blake2b512 => 64,
        }
    }

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake2b512 => "blake2b512",
            Self::Blake2s256 => "blake2s256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytestream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamsBytestream {
    /// Last segment of the content.
    pub final_segment: u32,
}

/// RTC parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamsRtc {
    /// Producer timestamp (ms).
    pub timestamp: u64,
    /// Production rate (bytes per second).
    pub production_rate: u32,
    /// Segment being produced.
    pub current_segment: u32,
    /// Whether the producer adds FEC.
    pub support_fec: bool,
}

/// Transport parameter block. The variant fixes the transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportParams {
    /// No parameters; transport type `Unknown`.
    #[default]
    None,
    /// Bytestream parameters.
    Bytestream(ParamsBytestream),
    /// RTC parameters.
    Rtc(ParamsRtc),
}

impl TransportParams {
    /// Transport type recorded in the meta block.
    pub fn transport_type(&self) -> TransportType {
        match self {
            Self::None => TransportType::Unknown,
            Self::Bytestream(_) => TransportType::Bytestream,
            Self::Rtc(_) => TransportType::Rtc,
        }
    }

    /// Size of the parameter block for `transport_type`.
    pub fn wire_size(transport_type: TransportType) -> usize {
        match transport_type {
            TransportType::Unknown => 0,
            TransportType::Bytestream => PARAMS_BYTESTREAM_SIZE,
            TransportType::Rtc => PARAMS_RTC_SIZE,
        }
    }

    /// Append the parameter block to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::None => {}
            Self::Bytestream(params) => {
                buf.extend_from_slice(&params.final_segment.to_be_bytes());
            }
            Self::Rtc(params) => {
                buf.extend_from_slice(&params.timestamp.to_be_bytes());
                buf.extend_from_slice(&params.production_rate.to_be_bytes());
                buf.extend_from_slice(&params.current_segment.to_be_bytes());
                buf.extend_from_slice(&u32::from(params.support_fec).to_be_bytes());
            }
        }
    }

    /// Parse the block for `transport_type` from the start of `data`.
    pub fn decode(transport_type: TransportType, data: &[u8]) -> ManifestResult<Self> {
        let expected = Self::wire_size(transport_type);
        if data.len() < expected {
            return Err(ManifestError::TooShort {
                expected,
                actual: data.len(),
            });
        }

        Ok(match transport_type {
            TransportType::Unknown => Self::None,
            TransportType::Bytestream => Self::Bytestream(ParamsBytestream {
                final_segment: read_u32(data, 0),
            }),
            TransportType::Rtc => Self::Rtc(ParamsRtc {
                timestamp: read_u64(data, 0),
                production_rate: read_u32(data, 8),
                current_segment: read_u32(data, 12),
                support_fec: read_u32(data, 16) != 0,
            }),
        })
    }
}

/// Meta block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManifestHeader {
    /// Format version.
    pub version: ManifestVersion,
    /// Manifest type.
    pub manifest_type: ManifestType,
    /// Transport type; selects the parameter block.
    pub transport_type: TransportType,
    /// Digest algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Last manifest of the stream.
    pub is_last: bool,
}

impl ManifestHeader {
    /// Serialize the 4-byte meta block.
    pub fn to_bytes(&self) -> [u8; META_SIZE] {
        [
            (self.version as u8 & 0x0f) | ((self.manifest_type as u8) << 4),
            self.transport_type.as_byte(),
            self.hash_algorithm.as_byte(),
            u8::from(self.is_last),
        ]
    }

    /// Parse the meta block from the start of `data`.
    pub fn from_bytes(data: &[u8]) -> ManifestResult<Self> {
        if data.len() < META_SIZE {
            return Err(ManifestError::TooShort {
                expected: META_SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            version: ManifestVersion::from_nibble(data[0] & 0x0f)?,
            manifest_type: ManifestType::from_nibble(data[0] >> 4)?,
            transport_type: TransportType::from_byte(data[1])
                .ok_or(ManifestError::UnknownTransportType(data[1]))?,
            hash_algorithm: HashAlgorithm::from_byte(data[2])?,
            is_last: data[3] != 0,
        })
    }
}

/// Version nibble of an encoded manifest, without validating the rest.
pub fn peek_version(data: &[u8]) -> ManifestResult<u8> {
    data.first()
        .map(|b| b & 0x0f)
        .ok_or(ManifestError::TooShort {
            expected: META_SIZE,
            actual: 0,
        })
}

/// Bytes before the first entry for `transport_type`.
pub fn header_size(transport_type: TransportType) -> usize {
    META_SIZE + ENTRY_META_SIZE + TransportParams::wire_size(transport_type)
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}
