//! Protocol constants for the RTC transport.
//!
//! Wire sizes are fixed by the packet formats. Controller tunables are the
//! defaults used when a [`crate::transport::ConsumerConfig`] does not override them.

use std::time::Duration;

// =============================================================================
// PACKET CONSTANTS
// =============================================================================

/// Payload length that identifies a NACK (production segment + production rate).
pub const NACK_HEADER_SIZE: usize = 8;

/// Producer timestamp prepended to every data payload (u64 milliseconds).
pub const TIMESTAMP_SIZE: usize = 8;

/// Initial guess for the average data packet size, in bytes.
pub const INIT_PACKET_SIZE: f64 = 1300.0;

/// Network header overhead counted per received data packet (IPv6 + TCP).
pub const PACKET_HEADER_SIZE: usize = 60;

/// Interest lifetime used by RTC consumers.
pub const RTC_INTEREST_LIFETIME: Duration = Duration::from_millis(1000);

// =============================================================================
// SEQUENCE SPACE
// =============================================================================

/// First sequence number reserved for RTT probes. Data sequences wrap here.
pub const MIN_PROBE_SEQ: u32 = 0xefff_ffff;

/// Last sequence number reserved for RTT probes.
pub const MAX_PROBE_SEQ: u32 = 0xffff_ffff;

/// Default ring exponent: the inflight ring holds `2^12` slots.
pub const DEFAULT_LOG2_BUFFER_SIZE: u8 = 12;

/// Smallest accepted ring exponent.
pub const MIN_LOG2_BUFFER_SIZE: u8 = 4;

/// Largest accepted ring exponent.
pub const MAX_LOG2_BUFFER_SIZE: u8 = 16;

// =============================================================================
// CONTROLLER TIMING
// =============================================================================

/// Length of one statistics round.
pub const ROUND_LEN: Duration = Duration::from_millis(200);

/// Interval between two RTT probes.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(1000);

/// How long NACKs from an inactive producer are ignored.
pub const NACK_COOLDOWN: Duration = Duration::from_millis(500);

/// Rounds without NACKs needed to leave the SYNC phase.
pub const ROUNDS_IN_SYNC_BEFORE_SWITCH: u32 = 3;

// =============================================================================
// RETRANSMISSIONS
// =============================================================================

/// Maximum retransmissions of a single sequence.
pub const MAX_RTX: u32 = 10;

/// Maximum number of sequences waiting for retransmission.
pub const MAX_RTX_SIZE: usize = 1024;

/// Pending retransmissions this far behind the last in-order receipt are dropped.
pub const MAX_RTX_MAX_AGE: u32 = 10_000;

// =============================================================================
// CONGESTION WINDOW
// =============================================================================

/// Window at session start, in packets.
pub const INITIAL_CWIN: u32 = 1;

/// Upper window bound before any bandwidth estimate exists.
pub const INITIAL_CWIN_MAX: u32 = 100_000;

/// Lower window bound, in packets.
pub const MIN_CWIN: u32 = 10;

/// Multiplicative increase applied when the window is well below the maximum.
pub const WIN_INCREASE_FACTOR: f64 = 1.5;

/// Multiplicative decrease applied when the window exceeds the maximum.
pub const WIN_DECREASE_FACTOR: f64 = 0.9;

// =============================================================================
// ESTIMATORS
// =============================================================================

/// Slack applied to the bandwidth-delay product.
pub const BANDWIDTH_SLACK_FACTOR: f64 = 1.8;

/// EWMA weight of the previous bandwidth estimate.
pub const ESTIMATED_BW_ALPHA: f64 = 0.7;

/// EWMA weight of the previous average packet size.
pub const ESTIMATED_PACKET_SIZE_ALPHA: f64 = 0.7;

/// EWMA weight of the previous loss rate.
pub const ESTIMATED_LOSSES_ALPHA: f64 = 0.8;

/// Fraction of the interest lifetime used to bound outstanding Interests.
pub const INTEREST_LIFETIME_REDUCTION_FACTOR: f64 = 0.8;

/// Smoothing factor for per-path OWD and inter-arrival averages.
pub const PATH_ALPHA: f64 = 0.125;

/// Rounds of per-round minimum RTT / OWD kept per path.
pub const PATH_HISTORY_ROUNDS: usize = 30;

/// Rounds without any sample after which a path is considered inactive (20 s).
pub const MAX_ROUNDS_WITHOUT_SAMPLES: u32 = 100;

/// Milliseconds in one second.
pub const MILLIS_IN_A_SEC: f64 = 1000.0;
