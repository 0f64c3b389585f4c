//! Manifests binding content suffixes to packet digests.
//!
//! A producer periodically publishes a manifest listing the digests of the
//! segments it produced; the consumer decodes it and checks each segment
//! against its binding before consuming it.
//!
//! - **Wire format**: [`ManifestHeader`], [`TransportParams`], [`sizes`]
//! - **Fixed layout codec**: [`FixedManifestEncoder`], [`FixedManifestDecoder`]
//! - **Format selection**: [`ManifestCodec`], [`codec_for_version`]
//! - **Verification**: [`PacketDigest`], [`SuffixMap`]
//!
//! Signing and signature verification are not part of this module; the
//! encoder only reserves room for a trailing signature.

mod codec;
mod digest;
mod error;
mod fixed;
mod format;
mod model;

pub use codec::*;
pub use digest::*;
pub use error::*;
pub use fixed::*;
pub use format::{
    HashAlgorithm, ManifestHeader, ManifestType, ManifestVersion, ParamsBytestream, ParamsRtc,
    TransportParams, header_size, peek_version, sizes,
};
pub use model::*;
