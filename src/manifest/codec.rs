//! Wire format selection.

use crate::core::TransportType;

use super::error::{ManifestError, ManifestResult};
use super::fixed::{FixedManifestDecoder, FixedManifestEncoder};
use super::format::sizes::{ENTRY_SIZE, MAX_ENTRIES};
use super::format::{ManifestVersion, header_size, peek_version};
use super::model::Manifest;

/// A manifest wire format.
pub trait ManifestCodec: Send + Sync {
    /// Version nibble this codec handles.
    fn version(&self) -> ManifestVersion;

    /// Bytes before the first entry for `transport_type`.
    fn header_size(&self, transport_type: TransportType) -> usize;

    /// Size of one entry.
    fn entry_size(&self) -> usize;

    /// Serialize `manifest`.
    fn encode(&self, manifest: &Manifest) -> ManifestResult<Vec<u8>>;

    /// Parse `data`.
    fn decode(&self, data: &[u8]) -> ManifestResult<Manifest>;
}

/// The fixed-layout format.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCodec;

impl ManifestCodec for FixedCodec {
    fn version(&self) -> ManifestVersion {
        ManifestVersion::Fixed
    }

    fn header_size(&self, transport_type: TransportType) -> usize {
        header_size(transport_type)
    }

    fn entry_size(&self) -> usize {
        ENTRY_SIZE
    }

    fn encode(&self, manifest: &Manifest) -> ManifestResult<Vec<u8>> {
        if manifest.entries.len() > MAX_ENTRIES {
            return Err(ManifestError::TooManyEntries { max: MAX_ENTRIES });
        }
        FixedManifestEncoder::from_manifest(manifest.clone()).encode()
    }

    fn decode(&self, data: &[u8]) -> ManifestResult<Manifest> {
        FixedManifestDecoder::new(data)?.decode()
    }
}

/// Codec for a version nibble.
pub fn codec_for_version(version: u8) -> ManifestResult<&'static dyn ManifestCodec> {
    match ManifestVersion::from_nibble(version)? {
        ManifestVersion::Fixed => Ok(&FixedCodec),
    }
}

/// Decode a manifest with the codec its version nibble selects.
pub fn decode_manifest(data: &[u8]) -> ManifestResult<Manifest> {
    codec_for_version(peek_version(data)?)?.decode(data)
}
