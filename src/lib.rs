//! # icn-rtc
//!
//! Real-time consumer transport for information-centric networks.
//!
//! A consumer pulls a live stream from a producer by sending one named
//! Interest per segment. This crate decides how many Interests to keep in
//! flight and what to do with every answer:
//!
//! - **Congestion control**: a SYNC/NORMAL window controller driven by
//!   producer NACKs and per-round bandwidth estimates
//! - **Path statistics**: RTT, one-way delay and queuing delay per
//!   producer path, with fastest/slowest path selection
//! - **Loss recovery**: an inflight ring plus bounded retransmission
//!   scheduling paced by path skew
//! - **Manifests**: a fixed binary layout binding segment suffixes to
//!   packet digests
//!
//! ## Feature Flags
//!
//! - `transport` (default): RTC controller, path statistics, inflight tracking
//! - `session` (default): tokio event loop around the controller
//! - `manifest` (default): fixed-format manifest codec and digests
//!
//! ## Modules
//!
//! - [`core`]: Names, constants, time sources and collaborator traits (always included)
//! - [`transport`]: RTC consumer transport (requires `transport` feature)
//! - [`manifest`]: Manifest codec (requires `manifest` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use icn_rtc::prelude::*;
//!
//! #[derive(Default)]
//! struct Outbox(Vec<Interest>);
//!
//! impl Portal for Outbox {
//!     fn send_interest(&mut self, interest: Interest) {
//!         self.0.push(interest);
//!     }
//!
//!     fn is_interest_pending(&self, _name: &Name) -> bool {
//!         false
//!     }
//! }
//!
//! struct Player;
//!
//! impl ReadCallback for Player {
//!     fn is_buffer_movable(&self) -> bool {
//!         true
//!     }
//!     fn read_buffer_available(&mut self, frame: Vec<u8>) {
//!         assert_eq!(frame, b"frame");
//!     }
//!     fn get_read_buffer(&mut self) -> Option<&mut [u8]> {
//!         None
//!     }
//!     fn read_data_available(&mut self, _len: usize) {}
//! }
//!
//! let config = ConsumerConfig::builder()
//!     .network_name("b001::1".parse()?)
//!     .build()?;
//! let clock = ManualClock::new(0);
//! let reassembly = RtcReassembly::with_callback(Box::new(Player));
//! let mut controller = RtcController::new(config, Outbox::default(), clock.clone(), Box::new(reassembly));
//!
//! controller.start();
//! assert_eq!(controller.current_window(), 1);
//!
//! // Segment 0 answered 20 ms later: the window opens by one
//! clock.advance(20);
//! let name = controller.config().network_name().with_suffix(0);
//! let payload = encode_data_payload(clock.now_ms(), b"frame");
//! controller.on_content_object(ContentObject::new(name, 1, payload))?;
//! assert_eq!(controller.current_window(), 2);
//! # Ok::<(), icn_rtc::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Manifest codec (feature-gated)
#[cfg(feature = "manifest")]
#[cfg_attr(docsrs, doc(cfg(feature = "manifest")))]
pub mod manifest;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    // Transport types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        ConfigError, ConsumerConfig, ConsumerConfigBuilder, NackHeader, Phase, RtcController,
        RtcError, RtcReassembly, RtcResult, RtcStatistics, SocketOption, encode_data_payload,
    };

    #[cfg(feature = "session")]
    pub use crate::transport::{PortalEvent, RtcSession, SessionHandle};

    // Manifest types (when enabled)
    #[cfg(feature = "manifest")]
    pub use crate::manifest::{
        FixedManifestDecoder, FixedManifestEncoder, HashAlgorithm, Manifest, ManifestError,
        PacketDigest, SuffixMap,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{ContentObject, Error, Interest, Name, Portal, ReadCallback, TransportType};

#[cfg(feature = "transport")]
pub use transport::{ConsumerConfig, RtcController, RtcError};

#[cfg(feature = "manifest")]
pub use manifest::{FixedManifestDecoder, FixedManifestEncoder, Manifest};
