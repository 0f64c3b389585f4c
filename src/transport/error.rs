//! Transport layer error types.
//!
//! Timeouts, NACKs, reordering and retransmission pruning are absorbed by the
//! controller and never show up here. Only configuration mistakes and
//! application contract violations cross the controller boundary.

use thiserror::Error;

/// Rejected consumer configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Interest lifetime must be non-zero.
    #[error("interest lifetime must be greater than zero")]
    ZeroInterestLifetime,

    /// Ring exponent outside the accepted range.
    #[error("ring size exponent {value} outside [{min}, {max}]")]
    InvalidBufferSize {
        /// Requested exponent.
        value: u8,
        /// Smallest accepted exponent.
        min: u8,
        /// Largest accepted exponent.
        max: u8,
    },

    /// A timer interval must be non-zero.
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// The network name suffix falls inside the probe range.
    #[error("start segment {0} lies in the probe sequence range")]
    SuffixInProbeRange(u32),

    /// The consumer only implements the RTC production protocol.
    #[error("unsupported production protocol: {0}")]
    UnsupportedProtocol(&'static str),
}

/// RTC transport errors.
#[derive(Debug, Error)]
pub enum RtcError {
    /// Content arrived before a read callback was installed.
    #[error("the read callback must be installed before starting content retrieval")]
    ReadCallbackNotInstalled,

    /// The application lent a missing or empty buffer in copy mode.
    #[error("invalid buffer provided by the application")]
    InvalidReadBuffer,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The session task is gone.
    #[error("session closed")]
    SessionClosed,
}

impl RtcError {
    /// Check if this error stops content retrieval.
    ///
    /// Application contract violations are fatal: retrying cannot fix them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RtcError::ReadCallbackNotInstalled
                | RtcError::InvalidReadBuffer
                | RtcError::Config(_)
                | RtcError::SessionClosed
        )
    }
}

/// Result type for RTC transport operations.
pub type RtcResult<T> = Result<T, RtcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(RtcError::ReadCallbackNotInstalled.is_fatal());
        assert!(RtcError::InvalidReadBuffer.is_fatal());
        assert!(RtcError::SessionClosed.is_fatal());
        assert!(RtcError::Config(ConfigError::ZeroInterestLifetime).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidBufferSize {
            value: 20,
            min: 4,
            max: 16,
        };
        assert_eq!(err.to_string(), "ring size exponent 20 outside [4, 16]");

        let err: RtcError = ConfigError::ZeroInterval("round length").into();
        assert_eq!(
            err.to_string(),
            "configuration error: round length must be greater than zero"
        );
    }
}
