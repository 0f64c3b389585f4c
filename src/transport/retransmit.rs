//! Inflight and retransmission tracking.
//!
//! [`RetransmissionTracker`] pairs the [`InflightRing`] with an ordered map
//! of sequences waiting to be retransmitted. The map is ordered so that the
//! oldest (smallest) sequences are evicted first when it overflows.

use std::collections::BTreeMap;

use tracing::trace;

use crate::core::{MAX_RTX, MAX_RTX_MAX_AGE, MAX_RTX_SIZE};

use super::inflight::{InflightRing, SlotState};

/// Delays used to schedule retransmissions, in milliseconds.
///
/// Derived from the fastest and slowest active paths.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RtxTiming {
    /// Wait before the first retransmission:
    /// `slowest.min_rtt - fastest.min_rtt + slowest.inter_arrival_gap`.
    pub first: f64,
    /// Wait before every later retransmission: `fastest.min_rtt`.
    pub next: f64,
}

/// Inflight ring plus pending retransmissions.
#[derive(Debug, Clone)]
pub struct RetransmissionTracker {
    ring: InflightRing,
    /// Pending sequence -> retransmissions already sent.
    pending: BTreeMap<u32, u32>,
}

impl RetransmissionTracker {
    /// Create a tracker over a ring of `2^log2_size` slots.
    pub fn new(log2_size: u8) -> Self {
        Self {
            ring: InflightRing::new(log2_size),
            pending: BTreeMap::new(),
        }
    }

    /// The inflight ring.
    pub fn ring(&self) -> &InflightRing {
        &self.ring
    }

    /// Number of ring slots.
    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// State of `seq` (idle when another sequence owns the slot).
    pub fn state_of(&self, seq: u32) -> SlotState {
        self.ring.state_of(seq)
    }

    /// Claim the slot for `seq` and mark it sent.
    pub fn mark_sent(&mut self, seq: u32, now_ms: u64) {
        self.ring.mark_sent(seq, now_ms);
    }

    /// Record data for `seq`. Returns the previous state.
    ///
    /// A slot owned by another sequence is left untouched and `Idle` is
    /// returned.
    pub fn mark_received(&mut self, seq: u32) -> SlotState {
        self.transition(seq, SlotState::Received)
    }

    /// Record a NACK for `seq`. Returns the previous state.
    ///
    /// `lost` marks a NACK for content the producer has already moved past:
    /// it will never be requested again.
    pub fn mark_nacked(&mut self, seq: u32, lost: bool) -> SlotState {
        let state = if lost { SlotState::Lost } else { SlotState::Nacked };
        self.transition(seq, state)
    }

    fn transition(&mut self, seq: u32, state: SlotState) -> SlotState {
        let previous = self.ring.state_of(seq);
        if previous != SlotState::Idle {
            self.ring.set_state(seq, state);
        }
        previous
    }

    /// Record an Interest expiry for `seq`.
    ///
    /// Escalates `Sent -> Timeout1 -> Timeout2 -> Lost`; a sequence that
    /// already used all its retransmissions goes straight to `Lost`. Returns
    /// `(previous, current)` states, or `None` when `seq` does not own its
    /// slot.
    pub fn mark_timeout(&mut self, seq: u32) -> Option<(SlotState, SlotState)> {
        let previous = self.ring.owned(seq)?.state;
        if !previous.is_pending() {
            return Some((previous, previous));
        }

        let exhausted = self.pending.get(&seq).is_some_and(|&count| count >= MAX_RTX);
        let current = if exhausted {
            SlotState::Lost
        } else {
            previous.escalate()
        };
        self.ring.set_state(seq, current);
        Some((previous, current))
    }

    /// Schedule `start..stop` for retransmission.
    ///
    /// Sequences below `last_seg_nacked` are skipped: the producer said they
    /// are gone. So are sequences already answered or given up on. Already
    /// pending sequences keep their count. Returns how many sequences were
    /// added.
    pub fn add_retransmissions(
        &mut self,
        start: u32,
        stop: u32,
        now_ms: u64,
        last_seg_nacked: u32,
    ) -> u32 {
        // Anything below the newest MAX_RTX_SIZE would be evicted right away.
        let start = start
            .max(last_seg_nacked)
            .max(stop.saturating_sub(MAX_RTX_SIZE as u32));

        let mut added = 0;
        for seq in start..stop {
            if self.pending.contains_key(&seq) {
                continue;
            }
            if matches!(
                self.ring.state_of(seq),
                SlotState::Received | SlotState::Lost | SlotState::Nacked
            ) {
                continue;
            }
            self.pending.insert(seq, 0);
            // Retransmit relative to now, not to the original send.
            self.ring.set_tx_time(seq, now_ms);
            added += 1;
        }
        added
    }

    /// Collect the sequences due for retransmission at `now_ms`.
    ///
    /// Prunes the map first: oldest entries beyond the size cap, sequences
    /// whose slot was taken over, sequences that used all their attempts and
    /// sequences more than `MAX_RTX_MAX_AGE` behind `last_received`. Every
    /// returned sequence has its count bumped and its tx time reset.
    pub fn retransmit_due(
        &mut self,
        now_ms: u64,
        timing: RtxTiming,
        last_received: u32,
    ) -> Vec<u32> {
        while self.pending.len() > MAX_RTX_SIZE {
            if let Some((seq, _)) = self.pending.pop_first() {
                trace!(seq, "rtx map full, evicting oldest");
            }
        }

        let ring = &mut self.ring;
        let mut due = Vec::new();

        self.pending.retain(|&seq, count| {
            let Some(tx_time) = ring.owned(seq).map(|slot| slot.tx_time) else {
                return false;
            };
            if *count >= MAX_RTX {
                trace!(seq, "rtx attempts exhausted");
                return false;
            }
            if last_received > seq && last_received - seq > MAX_RTX_MAX_AGE {
                trace!(seq, last_received, "rtx too old");
                return false;
            }

            let delay = if *count == 0 { timing.first } else { timing.next };
            if now_ms as f64 >= tx_time as f64 + delay {
                ring.set_tx_time(seq, now_ms);
                *count += 1;
                due.push(seq);
            }
            true
        });

        due
    }

    /// Whether `seq` is waiting for retransmission.
    pub fn is_pending(&self, seq: u32) -> bool {
        self.pending.contains_key(&seq)
    }

    /// Retransmissions already sent for `seq`.
    pub fn rtx_count(&self, seq: u32) -> Option<u32> {
        self.pending.get(&seq).copied()
    }

    /// Stop tracking `seq`. Returns whether it was pending.
    pub fn remove(&mut self, seq: u32) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Drop every pending sequence below `seq`.
    pub fn purge_below(&mut self, seq: u32) {
        self.pending = self.pending.split_off(&seq);
    }

    /// Number of pending sequences.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Reset the ring and forget all pending sequences.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.pending.clear();
    }
}
