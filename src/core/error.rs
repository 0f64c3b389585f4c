//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised while parsing a [`Name`](super::Name).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The prefix is not an IPv4 or IPv6 address.
    #[error("invalid name prefix: {0}")]
    InvalidPrefix(String),

    /// The suffix is not a 32-bit unsigned integer.
    #[error("invalid name suffix: {0}")]
    InvalidSuffix(String),
}

/// Top-level crate errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Name parsing error.
    #[error("name error: {0}")]
    Name(#[from] NameError),

    /// Transport error.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::RtcError),

    /// Configuration error.
    #[cfg(feature = "transport")]
    #[error("configuration error: {0}")]
    Config(#[from] crate::transport::ConfigError),

    /// Manifest error.
    #[cfg(feature = "manifest")]
    #[error("manifest error: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),
}
