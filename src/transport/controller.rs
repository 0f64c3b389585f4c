//! RTC congestion controller.
//!
//! The controller is sans-IO: it sends Interests through a [`Portal`], is fed
//! content objects and expirations by its owner, and exposes its timers as
//! deadlines ([`RtcController::next_deadline`]) that the owner fires with
//! [`RtcController::on_timers`]. All calls must come from a single task.
//!
//! # Phases
//!
//! - **SYNC**: acquiring or re-acquiring the producer. The window is bounded
//!   only by how many Interests can wait at the producer within their
//!   lifetime, and moves by one packet per NACK/data event.
//! - **NORMAL**: steady state. Once per round the window is steered toward
//!   the bandwidth-delay product of the slowest active path plus 10%.
//!
//! SYNC becomes NORMAL after three rounds without NACKs or on a NACK for a
//! segment the producer has not reached yet. NORMAL becomes SYNC on a NACK
//! for a segment the producer has already moved past.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::core::{
    BANDWIDTH_SLACK_FACTOR, ContentObject, ESTIMATED_BW_ALPHA, ESTIMATED_LOSSES_ALPHA,
    ESTIMATED_PACKET_SIZE_ALPHA, INIT_PACKET_SIZE, INITIAL_CWIN, INITIAL_CWIN_MAX,
    INTEREST_LIFETIME_REDUCTION_FACTOR, Interest, MAX_PROBE_SEQ, MILLIS_IN_A_SEC, MIN_CWIN,
    MIN_PROBE_SEQ, PACKET_HEADER_SIZE, Portal, ROUNDS_IN_SYNC_BEFORE_SWITCH, TimeSource,
    WIN_DECREASE_FACTOR, WIN_INCREASE_FACTOR,
};

use super::config::ConsumerConfig;
use super::error::RtcError;
use super::inflight::SlotState;
use super::nack::{NackHeader, data_timestamp, is_nack};
use super::path::PathTable;
use super::reassembly::Reassembly;
use super::retransmit::{RetransmissionTracker, RtxTiming};

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Acquiring the producer; window not bounded by the BDP.
    Sync,
    /// Steady state; window bounded by the BDP.
    Normal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Sync => f.write_str("sync"),
            Phase::Normal => f.write_str("normal"),
        }
    }
}

/// Per-round summary handed to the application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtcStatistics {
    /// Queuing delay of the less congested producer path (ms).
    pub queuing_delay: f64,
    /// Smoothed fraction of segments lost in a round.
    pub loss_ratio: f64,
    /// Smoothed received bytes per second.
    pub estimated_bandwidth: f64,
    /// Current congestion window (packets).
    pub window: u32,
}

/// Application callback invoked once per round.
pub type StatsCallback = Box<dyn FnMut(&RtcStatistics) + Send>;

/// Mutable protocol state of one retrieval session.
#[derive(Debug, Clone)]
pub struct ProtocolState {
    /// Current phase.
    pub phase: Phase,
    /// Congestion window (packets).
    pub current_cwin: u32,
    /// Upper bound of the window (packets).
    pub max_cwin: u32,
    /// Next segment to request.
    pub actual_segment: u32,
    /// First-transmission Interests waiting for an answer.
    pub inflight: u32,

    /// Producer segment of the last NACK for past content.
    pub last_seg_nacked: u32,
    /// Last segment received on its first transmission. Never moves back.
    pub last_received: u32,
    /// Highest segment received on its first transmission.
    pub highest_received: u32,
    /// `highest_received` when the current round began.
    pub first_sequence_in_round: u32,
    /// Start of the current round (ms).
    pub last_round_begin: u64,

    /// Bytes received in this round (first transmissions only).
    pub received_bytes: u64,
    /// Interests sent in this round, retransmissions included.
    pub sent_interests: u32,
    /// Data packets received in this round.
    pub received_data: u32,
    /// Segments scheduled for retransmission in this round.
    pub packet_lost: u32,
    /// Retransmitted segments answered in this round.
    pub loss_recovered: u32,
    /// Smoothed data payload size (bytes).
    pub avg_packet_size: f64,

    /// A first-transmission NACK arrived this round.
    pub got_nack: bool,
    /// First-transmission NACKs for future content this round.
    pub got_future_nack: u32,
    /// Consecutive rounds without NACKs.
    pub rounds_without_nacks: u32,

    /// Smoothed bandwidth (bytes per second).
    pub estimated_bw: f64,
    /// Smoothed loss rate.
    pub loss_rate: f64,
    /// Whether `loss_rate` holds a sample.
    pub loss_rate_initialized: bool,
    /// Queuing delay (ms).
    pub queuing_delay: f64,
    /// Fastest and slowest active path labels.
    pub producer_paths: Option<(u32, u32)>,

    /// NACKs from an idle producer are being ignored.
    pub nack_suppressed: bool,
}

impl ProtocolState {
    fn new(max_cwin: u32, now_ms: u64) -> Self {
        Self {
            phase: Phase::Sync,
            current_cwin: INITIAL_CWIN,
            max_cwin,
            actual_segment: 0,
            inflight: 0,
            last_seg_nacked: 0,
            last_received: 0,
            highest_received: 0,
            first_sequence_in_round: 0,
            last_round_begin: now_ms,
            received_bytes: 0,
            sent_interests: 0,
            received_data: 0,
            packet_lost: 0,
            loss_recovered: 0,
            avg_packet_size: INIT_PACKET_SIZE,
            got_nack: false,
            got_future_nack: 0,
            rounds_without_nacks: 0,
            estimated_bw: 0.0,
            loss_rate: 0.0,
            loss_rate_initialized: false,
            queuing_delay: 0.0,
            producer_paths: None,
            nack_suppressed: false,
        }
    }

    fn reset_round_counters(&mut self) {
        self.got_nack = false;
        self.got_future_nack = 0;
        self.received_bytes = 0;
        self.sent_interests = 0;
        self.received_data = 0;
        self.packet_lost = 0;
        self.loss_recovered = 0;
        self.first_sequence_in_round = self.highest_received;
    }
}

/// Timer deadlines (ms). `None` is disarmed.
#[derive(Debug, Clone, Copy, Default)]
struct Timers {
    rtx: Option<u64>,
    nack: Option<u64>,
    probe: Option<u64>,
}

/// Outstanding RTT probe.
#[derive(Debug, Clone, Copy, Default)]
struct Probe {
    sequence: u32,
    sent_at: u64,
    answered: bool,
}

/// RTC consumer congestion controller.
pub struct RtcController<P, T> {
    config: ConsumerConfig,
    portal: P,
    clock: T,
    reassembly: Box<dyn Reassembly + Send>,
    stats_callback: Option<StatsCallback>,

    state: ProtocolState,
    tracker: RetransmissionTracker,
    paths: PathTable,
    timers: Timers,
    probe: Probe,
    running: bool,
}

impl<P: fmt::Debug, T> fmt::Debug for RtcController<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcController")
            .field("portal", &self.portal)
            .field("state", &self.state)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl<P: Portal, T: TimeSource> RtcController<P, T> {
    /// Create a stopped controller.
    pub fn new(
        config: ConsumerConfig,
        portal: P,
        clock: T,
        reassembly: Box<dyn Reassembly + Send>,
    ) -> Self {
        let tracker = RetransmissionTracker::new(config.log2_buffer_size());
        let now = clock.now_ms();
        let max_cwin = INITIAL_CWIN_MAX.clamp(MIN_CWIN, tracker.capacity());
        Self {
            config,
            portal,
            clock,
            reassembly,
            stats_callback: None,
            state: ProtocolState::new(max_cwin, now),
            tracker,
            paths: PathTable::new(),
            timers: Timers::default(),
            probe: Probe::default(),
            running: false,
        }
    }

    /// Install the per-round statistics callback.
    pub fn set_stats_callback(&mut self, callback: StatsCallback) {
        self.stats_callback = Some(callback);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start content retrieval.
    pub fn start(&mut self) {
        self.resume();
    }

    /// Start a fresh retrieval session: reset all state, probe and fill the
    /// window. No-op while running.
    pub fn resume(&mut self) {
        if self.running {
            return;
        }
        self.reset();
        self.running = true;
        debug!(name = %self.config.network_name(), "rtc retrieval started");

        self.probe_rtt();
        self.schedule_next_interests();
    }

    /// Halt retrieval. Pending timers are dropped without firing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.timers = Timers::default();
        debug!(
            segment = self.state.actual_segment,
            "rtc retrieval stopped"
        );
    }

    /// Clear counters, paths, the inflight ring and pending retransmissions.
    pub fn reset(&mut self) {
        let now = self.clock.now_ms();
        let max_cwin = INITIAL_CWIN_MAX.clamp(MIN_CWIN, self.tracker.capacity());
        self.state = ProtocolState::new(max_cwin, now);
        self.state.actual_segment = self.config.network_name().suffix();
        self.tracker.clear();
        self.paths.clear();
        self.timers = Timers::default();
        self.probe = Probe::default();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether retrieval is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Current congestion window.
    pub fn current_window(&self) -> u32 {
        self.state.current_cwin
    }

    /// Upper bound of the congestion window.
    pub fn max_window(&self) -> u32 {
        self.state.max_cwin
    }

    /// Next segment to request.
    pub fn actual_segment(&self) -> u32 {
        self.state.actual_segment
    }

    /// Protocol state.
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Inflight ring and pending retransmissions.
    pub fn tracker(&self) -> &RetransmissionTracker {
        &self.tracker
    }

    /// Per-path statistics.
    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// Sequence of the outstanding RTT probe.
    pub fn probe_sequence(&self) -> u32 {
        self.probe.sequence
    }

    /// Consumer configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// The portal.
    pub fn portal(&self) -> &P {
        &self.portal
    }

    /// The portal, mutably.
    pub fn portal_mut(&mut self) -> &mut P {
        &mut self.portal
    }

    /// Last computed statistics.
    pub fn statistics(&self) -> RtcStatistics {
        RtcStatistics {
            queuing_delay: self.state.queuing_delay,
            loss_ratio: self.state.loss_rate,
            estimated_bandwidth: self.state.estimated_bw,
            window: self.state.current_cwin,
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Earliest armed timer deadline (ms), if any.
    pub fn next_deadline(&self) -> Option<u64> {
        [self.timers.rtx, self.timers.nack, self.timers.probe]
            .into_iter()
            .flatten()
            .min()
    }

    /// Time left until [`next_deadline`](Self::next_deadline), zero if it
    /// already passed.
    pub fn time_to_next_deadline(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
    }

    /// Fire every timer whose deadline has passed.
    pub fn on_timers(&mut self) {
        if !self.running {
            return;
        }
        self.check_round();

        let now = self.clock.now_ms();
        if self.timers.probe.is_some_and(|at| at <= now) {
            self.timers.probe = None;
            self.probe_rtt();
        }
        if self.timers.nack.is_some_and(|at| at <= now) {
            self.timers.nack = None;
            self.state.nack_suppressed = false;
            debug!("nack cooldown over");
            self.schedule_next_interests();
        }
        if self.timers.rtx.is_some_and(|at| at <= now) {
            self.timers.rtx = None;
            self.check_rtx();
        }
    }

    // =========================================================================
    // Rounds and window
    // =========================================================================

    fn check_round(&mut self) {
        let now = self.clock.now_ms();
        let duration = now.saturating_sub(self.state.last_round_begin);
        if duration >= self.config.round_length().as_millis() as u64 {
            self.state.last_round_begin = now;
            self.update_stats(duration);
        }
    }

    fn update_stats(&mut self, round_duration: u64) {
        if self.paths.is_empty() {
            return;
        }
        let state = &mut self.state;

        if state.received_bytes != 0 {
            let bytes_per_sec =
                state.received_bytes as f64 * (MILLIS_IN_A_SEC / round_duration.max(1) as f64);
            state.estimated_bw = state.estimated_bw * ESTIMATED_BW_ALPHA
                + (1.0 - ESTIMATED_BW_ALPHA) * bytes_per_sec;
        }

        self.paths.round_end();
        if let Some(labels) = self.paths.fastest_and_slowest() {
            state.producer_paths = Some(labels);
        }
        let (fast, slow) = match state.producer_paths {
            Some((fast, slow)) => match (self.paths.get(fast), self.paths.get(slow)) {
                (Some(fast), Some(slow)) => (fast, slow),
                _ => return,
            },
            None => return,
        };

        // The less congested of the two paths is what the application sees.
        state.queuing_delay = fast.queuing_delay().min(slow.queuing_delay());

        if state.sent_interests != 0 && state.phase == Phase::Normal {
            let expected = state
                .highest_received
                .saturating_sub(state.first_sequence_in_round);
            let mut loss_rate = 0.0;
            if expected != 0 {
                loss_rate = (f64::from(state.packet_lost) - f64::from(state.loss_recovered))
                    / f64::from(expected);
            }
            let loss_rate = loss_rate.max(0.0);

            if state.loss_rate_initialized {
                state.loss_rate = state.loss_rate * ESTIMATED_LOSSES_ALPHA
                    + loss_rate * (1.0 - ESTIMATED_LOSSES_ALPHA);
            } else {
                state.loss_rate = loss_rate;
                state.loss_rate_initialized = true;
            }
        }

        if state.avg_packet_size == 0.0 {
            state.avg_packet_size = INIT_PACKET_SIZE;
        }

        // Sized on the slowest path so the window is never too small.
        let bdp = (state.estimated_bw * (slow.min_rtt() as f64 / MILLIS_IN_A_SEC)
            * BANDWIDTH_SLACK_FACTOR
            / state.avg_packet_size)
            .ceil() as u32;
        let bandwidth = state.estimated_bw.ceil() as u32;
        self.compute_max_window(bandwidth, bdp);

        let stats = self.statistics();
        if let Some(callback) = self.stats_callback.as_mut() {
            callback(&stats);
        }

        let state = &mut self.state;
        if !state.got_nack {
            state.rounds_without_nacks += 1;
            if state.phase == Phase::Sync
                && state.rounds_without_nacks >= ROUNDS_IN_SYNC_BEFORE_SWITCH
            {
                state.phase = Phase::Normal;
                debug!(rounds = state.rounds_without_nacks, "sync -> normal");
            }
        } else {
            state.rounds_without_nacks = 0;
        }

        self.update_window();
        debug!(
            phase = %self.state.phase,
            cwin = self.state.current_cwin,
            max_cwin = self.state.max_cwin,
            bw = self.state.estimated_bw,
            loss = self.state.loss_rate,
            queuing_delay = self.state.queuing_delay,
            "round"
        );

        self.state.reset_round_counters();
    }

    /// Recompute the window bound from the production rate (bytes/s) and,
    /// in NORMAL, the bandwidth-delay product (packets).
    fn compute_max_window(&mut self, production_rate: u32, bdp: u32) {
        if production_rate == 0 {
            // Nothing known about the producer: keep the previous bound.
            return;
        }

        let lifetime_ms = self.config.interest_lifetime().as_millis() as f64;
        let max_waiting = (f64::from(production_rate) / self.state.avg_packet_size
            * (lifetime_ms * INTEREST_LIFETIME_REDUCTION_FACTOR / MILLIS_IN_A_SEC))
            .ceil() as u32;

        let max_cwin = match self.state.phase {
            // The BDP is most likely wrong while syncing.
            Phase::Sync => max_waiting,
            Phase::Normal if bdp != 0 => (f64::from(bdp) * 1.1).ceil() as u32,
            Phase::Normal => max_waiting.min(self.state.max_cwin),
        };
        self.state.max_cwin = max_cwin.clamp(MIN_CWIN, self.tracker.capacity());
    }

    /// Per-round window adjustment. Keeps `MIN_CWIN <= cwin <= max_cwin`.
    fn update_window(&mut self) {
        let state = &mut self.state;
        if state.phase == Phase::Normal {
            let cwin = f64::from(state.current_cwin);
            if cwin < f64::from(state.max_cwin) * 0.7 {
                state.current_cwin = state
                    .max_cwin
                    .min((cwin * WIN_INCREASE_FACTOR) as u32);
            } else if state.current_cwin > state.max_cwin {
                state.current_cwin = ((cwin * WIN_DECREASE_FACTOR) as u32).max(MIN_CWIN);
            }
        }
        state.current_cwin = state.current_cwin.clamp(MIN_CWIN, state.max_cwin);
    }

    /// SYNC only: shrink after a NACK for future content.
    fn decrease_window(&mut self) {
        let state = &mut self.state;
        if state.phase == Phase::Normal {
            return;
        }
        let smaller = state.current_cwin.saturating_sub(1);
        state.current_cwin = if state.got_future_nack == 1 {
            smaller.min((f64::from(state.max_cwin) * 0.66).ceil() as u32)
        } else {
            smaller
        };
        state.current_cwin = state.current_cwin.max(MIN_CWIN);
    }

    /// SYNC only: grow after data or a NACK for past content.
    fn increase_window(&mut self) {
        let state = &mut self.state;
        if state.phase == Phase::Normal {
            return;
        }
        let cwin = f64::from(state.current_cwin);
        if cwin < f64::from(state.max_cwin) * 0.5 {
            state.current_cwin += 1;
        } else {
            let linear = (cwin + 1.0 / cwin.max(1.0)).ceil() as u32;
            state.current_cwin = state.max_cwin.min(linear);
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    fn send_interest(&mut self, seq: u32, rtx: bool) {
        if !self.running {
            return;
        }
        let name = self.config.network_name().with_suffix(seq);
        trace!(%name, rtx, "sending interest");
        self.portal
            .send_interest(Interest::new(name, self.config.interest_lifetime()));

        self.state.sent_interests = self.state.sent_interests.wrapping_add(1);
        if !rtx {
            self.state.inflight += 1;
        }
    }

    fn advance_segment(&mut self) {
        self.state.actual_segment = (self.state.actual_segment + 1) % MIN_PROBE_SEQ;
    }

    /// Fill the window with new Interests.
    fn schedule_next_interests(&mut self) {
        self.check_round();
        if !self.running {
            return;
        }

        while self.state.inflight < self.state.current_cwin {
            let seq = self.state.actual_segment;
            let name = self.config.network_name().with_suffix(seq);

            if self.portal.is_interest_pending(&name) {
                self.advance_segment();
                continue;
            }
            // Already answered or given up on
            if matches!(
                self.tracker.state_of(seq),
                SlotState::Received | SlotState::Lost
            ) {
                self.advance_segment();
                continue;
            }

            self.tracker.mark_sent(seq, self.clock.now_ms());
            self.advance_segment();
            self.send_interest(seq, false);
            self.check_round();
        }
    }

    /// Send an RTT probe from the reserved sequence range and rearm the
    /// probe timer.
    fn probe_rtt(&mut self) {
        let now = self.clock.now_ms();
        let sequence = rand::thread_rng().gen_range(MIN_PROBE_SEQ..=MAX_PROBE_SEQ);
        self.probe = Probe {
            sequence,
            sent_at: now,
            answered: false,
        };

        // Counted as a retransmission so it never occupies the window.
        self.send_interest(sequence, true);
        self.timers.probe = Some(now + self.config.probe_interval().as_millis() as u64);
    }

    // =========================================================================
    // Retransmissions
    // =========================================================================

    fn add_retransmission(&mut self, seq: u32) {
        self.add_retransmissions(seq, seq.saturating_add(1));
    }

    fn add_retransmissions(&mut self, start: u32, stop: u32) {
        let now = self.clock.now_ms();
        let added =
            self.tracker
                .add_retransmissions(start, stop, now, self.state.last_seg_nacked);
        self.state.packet_lost = self.state.packet_lost.wrapping_add(added);

        if self.timers.rtx.is_none() {
            self.check_rtx();
        }
    }

    /// Retransmit what is due and rearm the timer, or disarm it when
    /// nothing is pending.
    fn check_rtx(&mut self) {
        if !self.tracker.has_pending() {
            self.timers.rtx = None;
            return;
        }

        let fast_gap = self
            .state
            .producer_paths
            .and_then(|(fast, _)| self.paths.get(fast))
            .map(|path| path.inter_arrival_gap());
        let wait = match fast_gap {
            Some(gap) => ((gap / 2.0).floor() as u64).max(1),
            None => 1,
        };

        self.retransmit();
        self.timers.rtx = Some(self.clock.now_ms() + wait);
    }

    fn retransmit(&mut self) {
        let now = self.clock.now_ms();
        let timing = self.rtx_timing();
        let due = self
            .tracker
            .retransmit_due(now, timing, self.state.last_received);
        for seq in due {
            self.send_interest(seq, true);
        }
    }

    fn rtx_timing(&self) -> RtxTiming {
        let Some((fast, slow)) = self.state.producer_paths else {
            return RtxTiming::default();
        };
        let fast = self.paths.get(fast);
        let slow = self.paths.get(slow);

        let first = match (fast, slow) {
            // Path skew plus one inter-arrival gap.
            (Some(fast), Some(slow)) => {
                slow.min_rtt() as f64 - fast.min_rtt() as f64 + slow.inter_arrival_gap()
            }
            _ => 0.0,
        };
        let next = fast.map_or(0.0, |fast| fast.min_rtt() as f64);
        RtxTiming { first, next }
    }

    // =========================================================================
    // Incoming packets
    // =========================================================================

    /// Handle an expired Interest.
    pub fn on_timeout(&mut self, interest: &Interest) {
        let seq = interest.suffix();
        if !self.running || seq >= MIN_PROBE_SEQ {
            return;
        }

        if let Some((previous, current)) = self.tracker.mark_timeout(seq) {
            if previous == SlotState::Sent {
                self.state.inflight = self.state.inflight.saturating_sub(1);
            }
            if current == SlotState::Lost {
                self.tracker.remove(seq);
                debug!(seq, "segment lost");
            } else if current.is_pending() {
                self.add_retransmission(seq);
            }
        }

        self.schedule_next_interests();
    }

    /// Handle data or a NACK. Ignored while stopped.
    ///
    /// Fails only when the reassembly sink reports a fatal error.
    pub fn on_content_object(&mut self, content: ContentObject) -> Result<(), RtcError> {
        if !self.running {
            return Ok(());
        }
        let now = self.clock.now_ms();
        let seq = content.suffix();

        if seq >= MIN_PROBE_SEQ {
            self.on_probe_response(&content, now);
            return Ok(());
        }

        let mut schedule_next = true;
        let previous = self.tracker.state_of(seq);

        if let Some(nack) = NackHeader::parse(&content.payload) {
            schedule_next = self.check_if_producer_is_active(&nack, now);

            if previous == SlotState::Sent {
                self.state.inflight = self.state.inflight.saturating_sub(1);
            }

            let mut old_nack = false;
            if schedule_next {
                let rtx = self.tracker.is_pending(seq);
                old_nack = self.on_nack(&nack, seq, rtx);
                if !rtx {
                    self.update_delay_stats(&content, previous, now);
                }
            }
            // Every answer changes the state so inflight is never decremented twice.
            self.tracker.mark_nacked(seq, old_nack);
        } else {
            let len = content.payload_len();
            self.state.avg_packet_size = ESTIMATED_PACKET_SIZE_ALPHA * self.state.avg_packet_size
                + (1.0 - ESTIMATED_PACKET_SIZE_ALPHA) * len as f64;

            if previous == SlotState::Sent {
                self.state.inflight = self.state.inflight.saturating_sub(1);

                // Only first transmissions measure the producer.
                if !self.tracker.is_pending(seq) {
                    self.state.received_bytes += (len + PACKET_HEADER_SIZE) as u64;
                    self.update_delay_stats(&content, previous, now);

                    // Late answers neither backfill nor move the in-order mark back.
                    if seq > self.state.last_received {
                        self.add_retransmissions(self.state.last_received.saturating_add(1), seq);
                        self.state.last_received = seq;
                    }
                    if seq > self.state.highest_received {
                        self.state.highest_received = seq;
                    }
                }
            }

            self.state.received_data = self.state.received_data.wrapping_add(1);
            self.tracker.mark_received(seq);
            self.reassembly.reassemble(content.payload, seq)?;
            self.increase_window();
        }

        if self.tracker.remove(seq) {
            self.state.loss_recovered = self.state.loss_recovered.wrapping_add(1);
        }

        if schedule_next {
            self.schedule_next_interests();
        }
        Ok(())
    }

    fn on_probe_response(&mut self, content: &ContentObject, now: u64) {
        if content.suffix() != self.probe.sequence
            || self.probe.answered
            || !is_nack(&content.payload)
        {
            trace!(seq = content.suffix(), "ignoring stale probe response");
            return;
        }
        // Probes never create paths.
        if !self.paths.contains(content.path_label) {
            return;
        }

        self.probe.answered = true;
        let rtt = now.saturating_sub(self.probe.sent_at);
        let path = self.paths.entry(content.path_label);
        path.insert_rtt_sample(rtt as i64);
        path.received_nack();
        trace!(path = content.path_label, rtt, "probe answered");
    }

    fn update_delay_stats(&mut self, content: &ContentObject, previous: SlotState, now: u64) {
        let seq = content.suffix();
        if previous != SlotState::Sent || self.tracker.is_pending(seq) {
            return;
        }
        let Some(slot) = self.tracker.ring().owned(seq) else {
            return;
        };
        let rtt = now as i64 - slot.tx_time as i64;

        let path = self.paths.entry(content.path_label);
        path.insert_rtt_sample(rtt);

        if is_nack(&content.payload) {
            path.received_nack();
        } else if let Some(timestamp) = data_timestamp(&content.payload) {
            path.insert_owd_sample(now as i64 - timestamp as i64);
            path.compute_inter_arrival_gap(seq, now);
        }
    }

    /// Returns `false` when the NACK comes from an idle producer and was
    /// handled (or ignored) here.
    fn check_if_producer_is_active(&mut self, nack: &NackHeader, now: u64) -> bool {
        if !nack.is_producer_idle() {
            return true;
        }
        if self.state.nack_suppressed {
            return false;
        }

        // Only the first idle NACK counts; resume at the announced segment later.
        self.state.nack_suppressed = true;
        self.state.actual_segment = nack.production_segment % MIN_PROBE_SEQ;
        self.timers.nack = Some(now + self.config.nack_cooldown().as_millis() as u64);
        debug!(
            production_segment = nack.production_segment,
            "producer idle, pausing"
        );
        false
    }

    /// Returns `true` for a NACK on content the producer already moved past.
    fn on_nack(&mut self, nack: &NackHeader, nack_segment: u32, rtx: bool) -> bool {
        let production_segment = nack.production_segment;

        if !rtx {
            self.state.got_nack = true;
            // Sync the estimate with the actual production rate.
            self.state.estimated_bw = f64::from(nack.production_rate);
        }

        if production_segment > nack_segment {
            // Asked for the past.
            self.state.actual_segment = production_segment
                .saturating_add(1)
                .max(self.state.actual_segment)
                % MIN_PROBE_SEQ;

            if !rtx {
                if self.state.phase == Phase::Normal {
                    self.state.phase = Phase::Sync;
                    debug!(production_segment, nack_segment, "normal -> sync");
                }
                self.compute_max_window(nack.production_rate, 0);
                self.increase_window();
            }

            self.tracker.purge_below(production_segment);
            self.state.last_seg_nacked = production_segment;
            trace!(production_segment, nack_segment, "past nack");
            true
        } else if production_segment < nack_segment {
            // Asked too far ahead.
            self.state.actual_segment = production_segment.saturating_add(1) % MIN_PROBE_SEQ;

            if !rtx {
                self.state.got_future_nack += 1;
                self.compute_max_window(nack.production_rate, 0);
                self.decrease_window();

                if self.state.phase == Phase::Sync {
                    self.state.phase = Phase::Normal;
                    debug!(production_segment, nack_segment, "sync -> normal");
                }
            }
            trace!(production_segment, nack_segment, "future nack");
            false
        } else {
            warn!(nack_segment, "nack for the segment in production");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::{ManualClock, Name, ReadCallback};
    use crate::transport::{RtcReassembly, encode_data_payload};

    const START: u64 = 1_000_000;

    #[derive(Debug, Default)]
    struct RecordingPortal {
        sent: Vec<Interest>,
        pending: HashSet<Name>,
    }

    impl RecordingPortal {
        fn suffixes(&self) -> Vec<u32> {
            self.sent
                .iter()
                .map(Interest::suffix)
                .filter(|&s| s < MIN_PROBE_SEQ)
                .collect()
        }
    }

    impl Portal for RecordingPortal {
        fn send_interest(&mut self, interest: Interest) {
            self.sent.push(interest);
        }

        fn is_interest_pending(&self, name: &Name) -> bool {
            self.pending.contains(name)
        }
    }

    struct Sink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl ReadCallback for Sink {
        fn is_buffer_movable(&self) -> bool {
            true
        }
        fn read_buffer_available(&mut self, buffer: Vec<u8>) {
            self.0.lock().unwrap().push(buffer);
        }
        fn get_read_buffer(&mut self) -> Option<&mut [u8]> {
            None
        }
        fn read_data_available(&mut self, _len: usize) {}
    }

    fn base_name() -> Name {
        "b001::1".parse().unwrap()
    }

    fn controller() -> (RtcController<RecordingPortal, ManualClock>, ManualClock) {
        let clock = ManualClock::new(START);
        let config = ConsumerConfig::builder()
            .network_name(base_name())
            .build()
            .unwrap();
        let sink = RtcReassembly::with_callback(Box::new(Sink(Arc::default())));
        let controller = RtcController::new(
            config,
            RecordingPortal::default(),
            clock.clone(),
            Box::new(sink),
        );
        (controller, clock)
    }

    fn data(seq: u32, path: u32, clock: &ManualClock, len: usize) -> ContentObject {
        let body = vec![0xab; len - 8];
        let payload = encode_data_payload(clock.now_ms() - 10, &body);
        ContentObject::new(base_name().with_suffix(seq), path, payload)
    }

    fn nack(seq: u32, path: u32, production_segment: u32, rate: u32) -> ContentObject {
        let payload = NackHeader::new(production_segment, rate).to_bytes().to_vec();
        ContentObject::new(base_name().with_suffix(seq), path, payload)
    }

    fn timeout(seq: u32) -> Interest {
        Interest::new(base_name().with_suffix(seq), RTC_LIFETIME)
    }

    const RTC_LIFETIME: std::time::Duration = crate::core::RTC_INTEREST_LIFETIME;

    #[test]
    fn test_start_sends_probe_and_first_interest() {
        let (mut c, _clock) = controller();
        c.start();

        assert!(c.is_running());
        assert_eq!(c.phase(), Phase::Sync);
        assert_eq!(c.current_window(), 1);
        assert_eq!(c.max_window(), 4096);

        let sent = &c.portal().sent;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].suffix() >= MIN_PROBE_SEQ);
        assert_eq!(sent[0].suffix(), c.probe_sequence());
        assert_eq!(sent[1].suffix(), 0);
        assert_eq!(sent[1].lifetime, RTC_LIFETIME);
        assert_eq!(c.state().inflight, 1);
    }

    #[test]
    fn test_pending_interests_are_skipped() {
        let (mut c, _clock) = controller();
        c.portal_mut().pending.insert(base_name().with_suffix(0));
        c.start();
        assert_eq!(c.portal().suffixes(), vec![1]);
    }

    #[test]
    fn test_data_grows_window_in_sync() {
        let (mut c, clock) = controller();
        c.start();

        clock.advance(40);
        c.on_content_object(data(0, 1, &clock, 1000)).unwrap();

        assert_eq!(c.current_window(), 2);
        assert_eq!(c.state().inflight, 2);
        assert_eq!(c.portal().suffixes(), vec![0, 1, 2]);
        assert_eq!(c.tracker().state_of(0), SlotState::Received);
        assert_eq!(c.state().received_bytes, 1060);
    }

    #[test]
    fn test_gap_schedules_retransmissions() {
        let (mut c, clock) = controller();
        c.start();
        clock.advance(10);
        c.on_content_object(data(0, 1, &clock, 500)).unwrap();
        clock.advance(10);
        c.on_content_object(data(1, 1, &clock, 500)).unwrap();
        // 2 and 3 are in flight; 4 arrives first
        clock.advance(10);
        c.on_content_object(data(4, 1, &clock, 500)).unwrap();

        assert_eq!(c.state().last_received, 4);
        assert_eq!(c.state().highest_received, 4);
        assert_eq!(c.state().packet_lost, 2);
        assert!(c.timers.rtx.is_some());

        // Unknown path timing: retransmitted right away
        let resent: Vec<u32> = c
            .portal()
            .suffixes()
            .into_iter()
            .filter(|&s| s == 2 || s == 3)
            .collect();
        assert_eq!(resent, vec![2, 3, 2, 3]);

        // The retransmitted copy of 2 counts as recovered
        clock.advance(10);
        c.on_content_object(data(2, 1, &clock, 500)).unwrap();
        assert_eq!(c.state().loss_recovered, 1);
        assert!(!c.tracker().is_pending(2));
        assert!(c.tracker().is_pending(3));
    }

    #[test]
    fn test_late_answer_does_not_backfill_received() {
        let (mut c, clock) = controller();
        c.start();
        c.state.current_cwin = 8;
        c.schedule_next_interests();

        clock.advance(10);
        c.on_content_object(data(0, 1, &clock, 500)).unwrap();
        c.on_content_object(data(3, 1, &clock, 500)).unwrap();
        assert!(c.tracker().is_pending(1));
        assert!(c.tracker().is_pending(2));

        // 1 and 2 use up their retransmissions
        for _ in 0..30 {
            clock.advance(1);
            c.on_timers();
        }
        assert!(!c.tracker().has_pending());

        c.on_content_object(data(4, 1, &clock, 500)).unwrap();
        c.on_content_object(data(1, 1, &clock, 500)).unwrap();
        assert_eq!(c.state().last_received, 4);

        let lost = c.state().packet_lost;
        c.on_content_object(data(5, 1, &clock, 500)).unwrap();
        assert_eq!(c.state().packet_lost, lost);
        assert_eq!(c.state().highest_received, 5);
        for seq in [3, 4] {
            assert_eq!(c.tracker().state_of(seq), SlotState::Received);
            assert!(!c.tracker().is_pending(seq));
        }
        let resent = c
            .portal()
            .suffixes()
            .into_iter()
            .filter(|&s| s == 3 || s == 4)
            .count();
        assert_eq!(resent, 2);
    }

    #[test]
    fn test_rtx_timer_disarms_when_map_empties() {
        let (mut c, clock) = controller();
        c.start();
        clock.advance(10);
        c.on_content_object(data(0, 1, &clock, 500)).unwrap();
        clock.advance(10);
        c.on_content_object(data(1, 1, &clock, 500)).unwrap();
        clock.advance(10);
        c.on_content_object(data(4, 1, &clock, 500)).unwrap();

        // No producer path yet: shortest wait
        assert_eq!(c.timers.rtx, Some(clock.now_ms() + 1));

        for _ in 0..50 {
            clock.advance(1);
            c.on_timers();
            if c.timers.rtx.is_none() {
                break;
            }
        }

        assert!(!c.tracker().has_pending());
        assert_eq!(c.timers.rtx, None);
        assert!(c.timers.probe.is_some());
        assert_eq!(c.next_deadline(), c.timers.probe);
    }

    #[test]
    fn test_rtx_timer_follows_fast_path_gap() {
        let (mut c, clock) = controller();
        c.start();

        let fast = c.paths.entry(1);
        fast.compute_inter_arrival_gap(10, 0);
        fast.compute_inter_arrival_gap(11, 9);
        c.state.producer_paths = Some((1, 1));

        c.add_retransmission(0);
        assert_eq!(c.timers.rtx, Some(clock.now_ms() + 4));

        // Half of a 1 ms gap rounds down to zero: clamped to 1 ms
        let tight = c.paths.entry(2);
        tight.compute_inter_arrival_gap(10, 0);
        tight.compute_inter_arrival_gap(11, 1);
        c.state.producer_paths = Some((2, 2));

        clock.advance(4);
        c.on_timers();
        assert!(c.tracker().is_pending(0));
        assert_eq!(c.timers.rtx, Some(clock.now_ms() + 1));
    }

    #[test]
    fn test_past_nack_resyncs() {
        let (mut c, clock) = controller();
        c.start();
        c.state.actual_segment = 50;

        // Pending retransmissions below and above the producer segment
        for seq in [40, 41, 42, 120] {
            c.tracker.mark_sent(seq, START);
            c.tracker.add_retransmissions(seq, seq + 1, START, 0);
        }

        clock.advance(20);
        c.on_content_object(nack(0, 1, 100, 1_000_000)).unwrap();

        assert_eq!(c.phase(), Phase::Sync);
        assert_eq!(c.current_window(), 2);
        assert_eq!(c.max_window(), 616);
        assert_eq!(c.state().last_seg_nacked, 100);
        assert_eq!(c.tracker().state_of(0), SlotState::Lost);
        assert!(c.state().got_nack);

        for seq in [40, 41, 42] {
            assert!(!c.tracker().is_pending(seq));
        }
        assert!(c.tracker().is_pending(120));

        // Next requests start right after the producer segment
        assert_eq!(c.portal().suffixes(), vec![0, 101, 102]);
    }

    #[test]
    fn test_past_nack_leaves_normal() {
        let (mut c, clock) = controller();
        c.start();
        c.state.phase = Phase::Normal;

        clock.advance(20);
        c.on_content_object(nack(0, 1, 10, 500_000)).unwrap();
        assert_eq!(c.phase(), Phase::Sync);
        assert_eq!(c.actual_segment(), 11 + c.state().inflight);
    }

    #[test]
    fn test_future_nack_shrinks_window() {
        let (mut c, clock) = controller();
        c.start();
        c.state.current_cwin = 40;
        c.state.actual_segment = 200;
        c.tracker.mark_sent(200, START);
        c.state.inflight += 1;

        clock.advance(20);
        c.on_content_object(nack(200, 1, 150, 1_300_000)).unwrap();

        // max = ceil(1000 pkt/s * 0.8 s) = 800; first future nack: min(39, 528)
        assert_eq!(c.max_window(), 800);
        assert_eq!(c.current_window(), 39);
        assert_eq!(c.phase(), Phase::Normal);
        assert_eq!(c.state().got_future_nack, 1);
        assert_eq!(c.tracker().state_of(200), SlotState::Nacked);
        // seq 0 still in flight: 151..=188 fill the remaining 38
        assert_eq!(c.portal().suffixes().last().copied(), Some(188));
    }

    #[test]
    fn test_idle_producer_cooldown() {
        let (mut c, clock) = controller();
        c.start();
        let sent_before = c.portal().sent.len();

        clock.advance(20);
        c.on_content_object(nack(0, 1, 500, 0)).unwrap();
        assert!(c.state().nack_suppressed);
        assert_eq!(c.actual_segment(), 500);
        assert_eq!(c.tracker().state_of(0), SlotState::Nacked);
        assert_eq!(c.state().inflight, 0);
        assert_eq!(c.portal().sent.len(), sent_before);
        assert_eq!(c.next_deadline(), Some(START + 20 + 500));

        // Second idle NACK is ignored while cooling down
        c.on_content_object(nack(0, 1, 900, 0)).unwrap();
        assert_eq!(c.actual_segment(), 500);
        assert_eq!(c.portal().sent.len(), sent_before);

        clock.advance(499);
        c.on_timers();
        assert!(c.state().nack_suppressed);

        clock.advance(1);
        c.on_timers();
        assert!(!c.state().nack_suppressed);
        assert_eq!(c.portal().suffixes(), vec![0, 500]);

        // After the cooldown idle NACKs are honored again
        clock.advance(20);
        c.on_content_object(nack(500, 1, 700, 0)).unwrap();
        assert_eq!(c.actual_segment(), 700);
    }

    #[test]
    fn test_three_timeouts_lose_segment() {
        let (mut c, clock) = controller();
        c.start();

        clock.advance(1000);
        c.on_timeout(&timeout(0));
        assert_eq!(c.tracker().state_of(0), SlotState::Timeout1);
        assert!(c.tracker().is_pending(0));
        assert_eq!(c.state().inflight, 1); // seq 1 took its place

        c.on_timeout(&timeout(0));
        assert_eq!(c.tracker().state_of(0), SlotState::Timeout2);

        c.on_timeout(&timeout(0));
        assert_eq!(c.tracker().state_of(0), SlotState::Lost);
        assert!(!c.tracker().is_pending(0));

        let sent_for_0 = |c: &RtcController<RecordingPortal, ManualClock>| {
            c.portal().suffixes().iter().filter(|&&s| s == 0).count()
        };
        let before = sent_for_0(&c);
        for _ in 0..50 {
            clock.advance(10);
            c.on_timers();
        }
        c.on_timeout(&timeout(1));
        assert_eq!(sent_for_0(&c), before);
    }

    #[test]
    fn test_stale_timeout_ignored() {
        let (mut c, clock) = controller();
        c.start();
        let capacity = c.tracker().capacity();

        clock.advance(1000);
        c.on_timeout(&timeout(capacity));
        assert_eq!(c.tracker().state_of(0), SlotState::Sent);
        assert_eq!(c.state().inflight, 1);

        // Probe expirations are not tracked
        let probe = c.probe_sequence();
        c.on_timeout(&timeout(probe));
        assert!(!c.tracker().has_pending());
    }

    #[test]
    fn test_path_selection_and_bdp() {
        let (mut c, clock) = controller();
        c.start();

        clock.advance(50);
        c.on_content_object(data(0, 1, &clock, 1300)).unwrap();
        clock.advance(150);
        c.on_content_object(data(1, 2, &clock, 1300)).unwrap();

        // Round closed at 200 ms
        assert_eq!(c.state().producer_paths, Some((1, 2)));
        assert_eq!(c.paths().get(1).unwrap().min_rtt(), 50);
        assert_eq!(c.paths().get(2).unwrap().min_rtt(), 150);

        // Fixed bandwidth, no new bytes in the next round
        c.state.phase = Phase::Normal;
        c.state.estimated_bw = 1_000_000.0;
        clock.advance(200);
        c.on_timers();

        // BDP on the 150 ms path: ceil(1e6 * 0.15 * 1.8 / 1300) = 208, +10%
        assert_eq!(c.max_window(), 229);
        assert_eq!(c.current_window(), 15);
    }

    #[test]
    fn test_window_bounds_after_update() {
        let (mut c, _clock) = controller();
        for phase in [Phase::Sync, Phase::Normal] {
            for max in [10, 50, 229, 4096] {
                for cwin in [1, 5, 10, 100, 300, 5000] {
                    c.state.phase = phase;
                    c.state.max_cwin = max;
                    c.state.current_cwin = cwin;
                    c.update_window();
                    let cwin_after = c.current_window();
                    assert!(
                        (MIN_CWIN..=max).contains(&cwin_after),
                        "{phase} max {max} cwin {cwin} -> {cwin_after}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_sync_to_normal_after_quiet_rounds() {
        let (mut c, clock) = controller();
        c.start();
        clock.advance(30);
        c.on_content_object(data(0, 1, &clock, 800)).unwrap();

        for _ in 0..ROUNDS_IN_SYNC_BEFORE_SWITCH {
            assert_eq!(c.phase(), Phase::Sync);
            clock.advance(200);
            c.on_timers();
        }
        assert_eq!(c.phase(), Phase::Normal);
    }

    #[test]
    fn test_stats_callback_once_per_round() {
        let (mut c, clock) = controller();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        c.set_stats_callback(Box::new(move |stats| sink.lock().unwrap().push(*stats)));
        c.start();

        clock.advance(30);
        c.on_content_object(data(0, 1, &clock, 800)).unwrap();
        clock.advance(200);
        c.on_timers();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].estimated_bandwidth > 0.0);
        // Reported before the round's window update
        assert_eq!(seen[0].window, 2);
    }

    #[test]
    fn test_probe_response() {
        let (mut c, clock) = controller();
        c.start();
        let probe = c.probe_sequence();

        // Unknown path: dropped
        clock.advance(5);
        c.on_content_object(nack(probe, 3, 0, 0)).unwrap();
        assert!(!c.paths().contains(3));

        clock.advance(5);
        c.on_content_object(data(0, 3, &clock, 600)).unwrap();
        let window = c.current_window();

        clock.advance(5);
        c.on_content_object(nack(probe, 3, 0, 0)).unwrap();
        assert_eq!(c.paths().get(3).unwrap().received_nacks(), 1);
        // Probes never touch the window or the idle-producer logic
        assert_eq!(c.current_window(), window);
        assert!(!c.state().nack_suppressed);

        // Answered once only
        c.on_content_object(nack(probe, 3, 0, 0)).unwrap();
        assert_eq!(c.paths().get(3).unwrap().received_nacks(), 1);

        // The probe is re-sent every interval
        clock.advance(1000);
        c.on_timers();
        assert_ne!(c.probe_sequence(), 0);
        assert_eq!(c.next_deadline().map(|d| d >= clock.now_ms()), Some(true));
    }

    #[test]
    fn test_missing_read_callback_is_fatal() {
        let clock = ManualClock::new(START);
        let config = ConsumerConfig::builder()
            .network_name(base_name())
            .build()
            .unwrap();
        let mut c = RtcController::new(
            config,
            RecordingPortal::default(),
            clock.clone(),
            Box::new(RtcReassembly::new()),
        );
        c.start();

        clock.advance(10);
        let err = c.on_content_object(data(0, 1, &clock, 100)).unwrap_err();
        assert!(matches!(err, RtcError::ReadCallbackNotInstalled));
    }

    #[test]
    fn test_stop_and_resume() {
        let (mut c, clock) = controller();
        c.start();
        clock.advance(10);
        c.on_content_object(data(0, 1, &clock, 500)).unwrap();

        c.stop();
        assert!(!c.is_running());
        assert_eq!(c.next_deadline(), None);

        let sent = c.portal().sent.len();
        c.on_timeout(&timeout(1));
        c.on_timers();
        assert_eq!(c.portal().sent.len(), sent);

        c.resume();
        assert!(c.is_running());
        assert_eq!(c.current_window(), 1);
        assert!(c.paths().is_empty());
        assert_eq!(c.tracker().state_of(0), SlotState::Sent);
        assert_eq!(c.state().received_data, 0);
    }
}
