//! Fixed-layout manifest encoder and decoder.

use tracing::trace;

use crate::core::{Name, TransportType};

use super::digest::PacketDigest;
use super::error::{ManifestError, ManifestResult};
use super::format::sizes::{DIGEST_SIZE, ENTRY_META_SIZE, ENTRY_SIZE, MAX_ENTRIES, META_SIZE};
use super::format::{
    HashAlgorithm, ManifestHeader, ManifestType, ParamsBytestream, ParamsRtc, TransportParams,
    header_size, read_u32,
};
use super::model::{Manifest, ManifestEntry};

/// Builds a fixed-layout manifest.
///
/// Entries are appended in order. With a size limit, an entry is refused
/// once the encoded manifest plus the reserved signature space would no
/// longer fit.
///
/// # Example
///
/// ```
/// use icn_rtc::manifest::{FixedManifestEncoder, HashAlgorithm, PacketDigest};
///
/// let mut encoder = FixedManifestEncoder::with_size_limit(1200, 256);
/// encoder
///     .set_base_name("b001::".parse().unwrap())
///     .set_hash_algorithm(HashAlgorithm::Sha256);
///
/// let digest = PacketDigest::compute(HashAlgorithm::Sha256, b"segment 10").unwrap();
/// encoder.add_suffix_and_hash(10, digest).unwrap();
///
/// let bytes = encoder.encode().unwrap();
/// assert_eq!(bytes.len(), encoder.estimate_serialized_length(0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FixedManifestEncoder {
    manifest: Manifest,
    max_size: Option<usize>,
    signature_size: usize,
}

impl FixedManifestEncoder {
    /// Create an encoder without a size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder whose output, plus `signature_size` reserved
    /// bytes, must fit in `max_size`.
    pub fn with_size_limit(max_size: usize, signature_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            signature_size,
            ..Self::default()
        }
    }

    /// Start from an existing manifest.
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            manifest,
            ..Self::default()
        }
    }

    /// Bytes before the first entry for `transport_type`.
    pub fn manifest_header_size(transport_type: TransportType) -> usize {
        header_size(transport_type)
    }

    /// Size of one entry.
    pub fn manifest_entry_size() -> usize {
        ENTRY_SIZE
    }

    /// Set the manifest type.
    pub fn set_type(&mut self, manifest_type: ManifestType) -> &mut Self {
        self.manifest.manifest_type = manifest_type;
        self
    }

    /// Set the digest algorithm.
    pub fn set_hash_algorithm(&mut self, algorithm: HashAlgorithm) -> &mut Self {
        self.manifest.hash_algorithm = algorithm;
        self
    }

    /// Mark the manifest as the last of the stream.
    pub fn set_is_last(&mut self, is_last: bool) -> &mut Self {
        self.manifest.is_last = is_last;
        self
    }

    /// Set the name prefix. The suffix is not encoded.
    pub fn set_base_name(&mut self, name: Name) -> &mut Self {
        self.manifest.base_name = name.with_suffix(0);
        self
    }

    /// Use bytestream parameters.
    pub fn set_params_bytestream(&mut self, params: ParamsBytestream) -> &mut Self {
        self.manifest.params = TransportParams::Bytestream(params);
        self
    }

    /// Use RTC parameters.
    pub fn set_params_rtc(&mut self, params: ParamsRtc) -> &mut Self {
        self.manifest.params = TransportParams::Rtc(params);
        self
    }

    /// Append an entry.
    pub fn add_suffix_and_hash(
        &mut self,
        suffix: u32,
        digest: PacketDigest,
    ) -> ManifestResult<&mut Self> {
        if self.manifest.entries.len() >= MAX_ENTRIES {
            return Err(ManifestError::TooManyEntries { max: MAX_ENTRIES });
        }
        self.check_limit(self.estimate_serialized_length(1))?;

        self.manifest.entries.push(ManifestEntry { suffix, digest });
        Ok(self)
    }

    /// Exact encoded size with `additional_entries` more entries.
    pub fn estimate_serialized_length(&self, additional_entries: usize) -> usize {
        header_size(self.transport_type())
            + (self.manifest.entries.len() + additional_entries) * ENTRY_SIZE
    }

    /// How many more entries can be added.
    pub fn remaining_entries(&self) -> usize {
        let by_count = MAX_ENTRIES.saturating_sub(self.manifest.entries.len());
        match self.max_size {
            Some(max_size) => {
                let room = max_size
                    .saturating_sub(self.signature_size)
                    .saturating_sub(self.estimate_serialized_length(0));
                by_count.min(room / ENTRY_SIZE)
            }
            None => by_count,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    /// Whether no entry was added.
    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }

    /// Transport type implied by the parameters.
    pub fn transport_type(&self) -> TransportType {
        self.manifest.transport_type()
    }

    /// The manifest being built.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Serialize.
    pub fn encode(&self) -> ManifestResult<Vec<u8>> {
        let manifest = &self.manifest;
        if manifest.entries.len() > MAX_ENTRIES {
            return Err(ManifestError::TooManyEntries { max: MAX_ENTRIES });
        }
        let size = self.estimate_serialized_length(0);
        self.check_limit(size)?;

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&manifest.header().to_bytes());

        buf.push(manifest.entries.len() as u8);
        buf.push(u8::from(manifest.base_name.is_ipv6()));
        buf.extend_from_slice(&[0, 0]);
        for word in manifest.base_name.prefix_words() {
            buf.extend_from_slice(&word.to_be_bytes());
        }

        manifest.params.encode_into(&mut buf);

        for entry in &manifest.entries {
            buf.extend_from_slice(&entry.suffix.to_be_bytes());
            buf.extend_from_slice(entry.digest.as_bytes());
        }

        debug_assert_eq!(buf.len(), size);
        trace!(entries = manifest.entries.len(), size, "encoded manifest");
        Ok(buf)
    }

    /// Drop all entries and reset the header fields. The size limit stays.
    pub fn clear(&mut self) {
        self.manifest = Manifest::default();
    }

    fn check_limit(&self, size: usize) -> ManifestResult<()> {
        match self.max_size {
            Some(limit) if size + self.signature_size > limit => {
                Err(ManifestError::SizeLimitExceeded {
                    size: size + self.signature_size,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Parses a fixed-layout manifest.
///
/// The meta block is read first; the transport type it carries selects the
/// parameter block. Bytes after the last entry (e.g. a signature) are
/// ignored.
#[derive(Debug, Clone, Copy)]
pub struct FixedManifestDecoder<'a> {
    data: &'a [u8],
    header: ManifestHeader,
}

impl<'a> FixedManifestDecoder<'a> {
    /// Read the meta block of `data`.
    pub fn new(data: &'a [u8]) -> ManifestResult<Self> {
        let header = ManifestHeader::from_bytes(data)?;
        Ok(Self { data, header })
    }

    /// Meta block fields.
    pub fn header(&self) -> ManifestHeader {
        self.header
    }

    /// Exact size of the encoded manifest, including
    /// `additional_entries` more entries.
    pub fn estimate_serialized_length(&self, additional_entries: usize) -> ManifestResult<usize> {
        let count = usize::from(self.entry_count()?);
        Ok(header_size(self.header.transport_type) + (count + additional_entries) * ENTRY_SIZE)
    }

    fn entry_count(&self) -> ManifestResult<u8> {
        self.data
            .get(META_SIZE)
            .copied()
            .ok_or(ManifestError::TooShort {
                expected: META_SIZE + ENTRY_META_SIZE,
                actual: self.data.len(),
            })
    }

    /// Decode the whole manifest. Fails without a partial result when the
    /// declared entry count runs past the buffer.
    pub fn decode(&self) -> ManifestResult<Manifest> {
        let data = self.data;
        let header_len = header_size(self.header.transport_type);
        if data.len() < header_len {
            return Err(ManifestError::TooShort {
                expected: header_len,
                actual: data.len(),
            });
        }

        let count = usize::from(data[META_SIZE]);
        let total = header_len + count * ENTRY_SIZE;
        if data.len() < total {
            return Err(ManifestError::TooShort {
                expected: total,
                actual: data.len(),
            });
        }

        let is_ipv6 = data[META_SIZE + 1] != 0;
        let prefix_at = META_SIZE + 4;
        let words = [
            read_u32(data, prefix_at),
            read_u32(data, prefix_at + 4),
            read_u32(data, prefix_at + 8),
            read_u32(data, prefix_at + 12),
        ];
        let base_name = Name::from_prefix_words(words, is_ipv6, 0);

        let params_at = META_SIZE + ENTRY_META_SIZE;
        let params = TransportParams::decode(self.header.transport_type, &data[params_at..])?;

        let entries = data[header_len..total]
            .chunks_exact(ENTRY_SIZE)
            .map(|chunk| {
                let mut digest = [0u8; DIGEST_SIZE];
                digest.copy_from_slice(&chunk[4..]);
                ManifestEntry {
                    suffix: read_u32(chunk, 0),
                    digest: PacketDigest::from_bytes(digest),
                }
            })
            .collect();

        Ok(Manifest {
            version: self.header.version,
            manifest_type: self.header.manifest_type,
            hash_algorithm: self.header.hash_algorithm,
            is_last: self.header.is_last,
            base_name,
            params,
            entries,
        })
    }
}
