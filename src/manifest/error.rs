//! Manifest encoding/decoding errors.

use thiserror::Error;

/// Manifest codec errors.
///
/// Decoding fails closed: any of these aborts the decode and no partial
/// entry list is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Input is shorter than the layout requires.
    #[error("manifest too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required by the header and declared entry count.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// No codec for this version nibble.
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u8),

    /// Unknown manifest type nibble.
    #[error("unknown manifest type {0}")]
    UnknownManifestType(u8),

    /// Unknown transport type byte.
    #[error("unknown transport type {0}")]
    UnknownTransportType(u8),

    /// Unknown hash algorithm byte.
    #[error("unknown hash algorithm {0}")]
    UnknownHashAlgorithm(u8),

    /// The hash algorithm cannot produce digests.
    #[error("cannot compute digests with hash algorithm {0}")]
    UnsupportedHashAlgorithm(&'static str),

    /// A digest slice does not fit the fixed entry width.
    #[error("digest of {0} bytes does not fit a manifest entry")]
    InvalidDigestLength(usize),

    /// The entry count field cannot hold another entry.
    #[error("manifest full: at most {max} entries")]
    TooManyEntries {
        /// Maximum entry count.
        max: usize,
    },

    /// The encoded manifest plus reserved signature would exceed the limit.
    #[error("manifest of {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded {
        /// Encoded size including reserved signature space.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ManifestError::TooShort {
            expected: 60,
            actual: 24,
        };
        assert_eq!(
            err.to_string(),
            "manifest too short: expected 60 bytes, got 24"
        );
        assert_eq!(
            ManifestError::TooManyEntries { max: 255 }.to_string(),
            "manifest full: at most 255 entries"
        );
    }
}
