//! Fixed-width packet digests.

use std::fmt;

use blake2::{Blake2b512, Blake2s256};
use sha2::{Digest, Sha256, Sha512};

use super::error::{ManifestError, ManifestResult};
use super::format::HashAlgorithm;
use super::format::sizes::DIGEST_SIZE;

/// Digest stored in a manifest entry.
///
/// Always [`DIGEST_SIZE`] bytes: longer hash outputs are truncated, shorter
/// ones zero-padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketDigest([u8; DIGEST_SIZE]);

impl PacketDigest {
    /// Wrap raw entry bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a digest from a hash output of at most [`DIGEST_SIZE`] bytes,
    /// zero-padding the rest.
    pub fn from_slice(bytes: &[u8]) -> ManifestResult<Self> {
        if bytes.len() > DIGEST_SIZE {
            return Err(ManifestError::InvalidDigestLength(bytes.len()));
        }
        let mut digest = [0u8; DIGEST_SIZE];
        digest[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(digest))
    }

    /// Hash `data` with `algorithm`, fitted to the entry width.
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> ManifestResult<Self> {
        let mut digest = [0u8; DIGEST_SIZE];
        match algorithm {
            HashAlgorithm::Sha256 => fit(&mut digest, &Sha256::digest(data)),
            HashAlgorithm::Sha512 => fit(&mut digest, &Sha512::digest(data)),
            HashAlgorithm::Blake2b512 => fit(&mut digest, &Blake2b512::digest(data)),
            HashAlgorithm::Blake2s256 => fit(&mut digest, &Blake2s256::digest(data)),
            HashAlgorithm::Unknown => {
                return Err(ManifestError::UnsupportedHashAlgorithm(algorithm.as_str()));
            }
        }
        Ok(Self(digest))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

fn fit(digest: &mut [u8; DIGEST_SIZE], output: &[u8]) {
    let n = output.len().min(DIGEST_SIZE);
    digest[..n].copy_from_slice(&output[..n]);
}

impl fmt::Debug for PacketDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketDigest({self})")
    }
}

impl fmt::Display for PacketDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_vector() {
        let digest = PacketDigest::compute(HashAlgorithm::Sha256, b"abc").unwrap();
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.to_string(), hex::encode(digest.as_bytes()));
    }

    #[test]
    fn test_sha512_truncated() {
        let digest = PacketDigest::compute(HashAlgorithm::Sha512, b"abc").unwrap();
        let full = Sha512::digest(b"abc");
        assert_eq!(digest.as_bytes()[..], full[..DIGEST_SIZE]);
    }

    #[test]
    fn test_algorithms_differ() {
        let algorithms = [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha512,
            HashAlgorithm::Blake2b512,
            HashAlgorithm::Blake2s256,
        ];
        let digests: Vec<_> = algorithms
            .iter()
            .map(|&a| PacketDigest::compute(a, b"segment").unwrap())
            .collect();
        for i in 0..digests.len() {
            for j in i + 1..digests.len() {
                assert_ne!(digests[i], digests[j]);
            }
        }
        assert!(PacketDigest::compute(HashAlgorithm::Unknown, b"x").is_err());
    }

    #[test]
    fn test_from_slice_pads() {
        let digest = PacketDigest::from_slice(&[0xaa; 20]).unwrap();
        assert_eq!(&digest.as_bytes()[..20], &[0xaa; 20]);
        assert_eq!(&digest.as_bytes()[20..], &[0u8; 12]);
        assert_eq!(
            PacketDigest::from_slice(&[0u8; 33]),
            Err(ManifestError::InvalidDigestLength(33))
        );
    }
}
