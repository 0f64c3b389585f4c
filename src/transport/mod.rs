//! RTC consumer transport.
//!
//! This module implements the receiver side of a real-time content stream
//! pulled from a producer one named segment at a time. It provides:
//!
//! - **Configuration**: [`ConsumerConfig`] and typed socket options
//! - **Path statistics**: [`PathStats`] RTT/OWD tracking per producer path
//! - **Inflight tracking**: [`InflightRing`] and [`RetransmissionTracker`]
//! - **NACK handling**: [`NackHeader`] wire format
//! - **Congestion control**: [`RtcController`] with SYNC/NORMAL phases
//! - **Delivery**: [`RtcReassembly`] handing payloads to the application
//! - **Async driver**: [`RtcSession`] running a controller on tokio
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Application                  │
//! ├─────────────────────────────────────────┤
//! │   Reassembly       (read callback)      │
//! ├─────────────────────────────────────────┤
//! │   RtcController    ← This module        │
//! │   window, rounds, NACKs, rtx, probes    │
//! ├─────────────────────────────────────────┤
//! │   Portal           (Interests out,      │
//! │                     content/timeouts in)│
//! └─────────────────────────────────────────┘
//! ```

mod config;
mod controller;
mod error;
mod inflight;
mod nack;
mod path;
mod reassembly;
mod retransmit;
#[cfg(feature = "session")]
mod session;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use inflight::*;
pub use nack::*;
pub use path::*;
pub use reassembly::*;
pub use retransmit::*;
#[cfg(feature = "session")]
pub use session::*;
