//! Decoded manifest and suffix-to-digest bindings.

use std::collections::HashMap;

use crate::core::{Name, TransportType};

use super::digest::PacketDigest;
use super::error::ManifestResult;
use super::format::{HashAlgorithm, ManifestHeader, ManifestType, ManifestVersion, TransportParams};

/// One manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Segment suffix.
    pub suffix: u32,
    /// Digest of the segment's packet.
    pub digest: PacketDigest,
}

/// A manifest as an owned value.
///
/// Produced by decoding; mutating it never touches the buffer it was
/// decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    /// Format version.
    pub version: ManifestVersion,
    /// Manifest type.
    pub manifest_type: ManifestType,
    /// Digest algorithm of the entries.
    pub hash_algorithm: HashAlgorithm,
    /// Last manifest of the stream.
    pub is_last: bool,
    /// Name prefix the suffixes apply to.
    pub base_name: Name,
    /// Transport parameters.
    pub params: TransportParams,
    /// Entries in encode order.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Transport type implied by the parameter block.
    pub fn transport_type(&self) -> TransportType {
        self.params.transport_type()
    }

    /// Meta block fields.
    pub fn header(&self) -> ManifestHeader {
        ManifestHeader {
            version: self.version,
            manifest_type: self.manifest_type,
            transport_type: self.transport_type(),
            hash_algorithm: self.hash_algorithm,
            is_last: self.is_last,
        }
    }

    /// `(suffix, digest)` pairs in encode order.
    pub fn suffix_hash_list(&self) -> impl Iterator<Item = (u32, &PacketDigest)> {
        self.entries.iter().map(|e| (e.suffix, &e.digest))
    }
}

/// Outcome of checking a packet against its manifest binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The digest matches.
    Match,
    /// A digest is bound but does not match.
    Mismatch,
    /// No manifest binds this suffix yet.
    Unbound,
}

/// Suffix to digest bindings merged from several manifests.
///
/// Later manifests override earlier bindings for the same suffix.
#[derive(Debug, Clone, Default)]
pub struct SuffixMap {
    bindings: HashMap<u32, (HashAlgorithm, PacketDigest)>,
}

impl SuffixMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the bindings of `manifests`.
    pub fn from_manifests<'a>(manifests: impl IntoIterator<Item = &'a Manifest>) -> Self {
        let mut map = Self::new();
        for manifest in manifests {
            map.insert_manifest(manifest);
        }
        map
    }

    /// Add every entry of `manifest`.
    pub fn insert_manifest(&mut self, manifest: &Manifest) {
        for entry in &manifest.entries {
            self.bindings
                .insert(entry.suffix, (manifest.hash_algorithm, entry.digest));
        }
    }

    /// Digest bound to `suffix`.
    pub fn get(&self, suffix: u32) -> Option<&PacketDigest> {
        self.bindings.get(&suffix).map(|(_, digest)| digest)
    }

    /// Check `packet` against the digest bound to `suffix`.
    pub fn verify(&self, suffix: u32, packet: &[u8]) -> ManifestResult<Verification> {
        let Some((algorithm, expected)) = self.bindings.get(&suffix) else {
            return Ok(Verification::Unbound);
        };
        let actual = PacketDigest::compute(*algorithm, packet)?;
        Ok(if actual == *expected {
            Verification::Match
        } else {
            Verification::Mismatch
        })
    }

    /// Drop the binding for `suffix` once its packet was consumed.
    pub fn remove(&mut self, suffix: u32) -> Option<PacketDigest> {
        self.bindings.remove(&suffix).map(|(_, digest)| digest)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
