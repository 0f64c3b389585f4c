//! Inflight packet ring.
//!
//! A fixed array of `2^k` slots indexed by `sequence mod 2^k`. Each slot
//! records which sequence currently owns it, so a stale event for an older
//! sequence that maps to the same slot can be recognized and ignored.
//! Writing a new sequence always overwrites the previous occupant.

/// State of a ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Never used.
    #[default]
    Idle,
    /// Interest sent, waiting for an answer.
    Sent,
    /// Expired once.
    Timeout1,
    /// Expired twice.
    Timeout2,
    /// Given up on.
    Lost,
    /// Data received.
    Received,
    /// NACK received.
    Nacked,
}

impl SlotState {
    /// Whether the sequence is still waiting for an answer.
    pub fn is_pending(self) -> bool {
        matches!(self, SlotState::Sent | SlotState::Timeout1 | SlotState::Timeout2)
    }

    /// Next state after an expiry. Anything past `Timeout2` is lost.
    pub fn escalate(self) -> SlotState {
        match self {
            SlotState::Sent => SlotState::Timeout1,
            SlotState::Timeout1 => SlotState::Timeout2,
            _ => SlotState::Lost,
        }
    }
}

/// One ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InflightSlot {
    /// Current state.
    pub state: SlotState,
    /// Sequence owning the slot.
    pub sequence: u32,
    /// Last transmission time (ms).
    pub tx_time: u64,
}

/// Fixed-size ring of inflight slots.
#[derive(Debug, Clone)]
pub struct InflightRing {
    slots: Vec<InflightSlot>,
    mask: u32,
}

impl InflightRing {
    /// Create a ring of `2^log2_size` idle slots.
    pub fn new(log2_size: u8) -> Self {
        let size = 1usize << log2_size;
        Self {
            slots: vec![InflightSlot::default(); size],
            mask: (size - 1) as u32,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    fn index(&self, seq: u32) -> usize {
        (seq & self.mask) as usize
    }

    /// Slot that `seq` maps to, whoever owns it.
    pub fn slot(&self, seq: u32) -> &InflightSlot {
        &self.slots[self.index(seq)]
    }

    /// Mutable slot that `seq` maps to, whoever owns it.
    pub fn slot_mut(&mut self, seq: u32) -> &mut InflightSlot {
        let idx = self.index(seq);
        &mut self.slots[idx]
    }

    /// Slot for `seq` only if `seq` owns it.
    pub fn owned(&self, seq: u32) -> Option<&InflightSlot> {
        let slot = self.slot(seq);
        (slot.sequence == seq && slot.state != SlotState::Idle).then_some(slot)
    }

    /// State of `seq`, `Idle` when another sequence owns the slot.
    pub fn state_of(&self, seq: u32) -> SlotState {
        self.owned(seq).map_or(SlotState::Idle, |slot| slot.state)
    }

    /// Claim the slot for `seq` and mark it sent at `now_ms`.
    pub fn mark_sent(&mut self, seq: u32, now_ms: u64) {
        *self.slot_mut(seq) = InflightSlot {
            state: SlotState::Sent,
            sequence: seq,
            tx_time: now_ms,
        };
    }

    /// Set the state of `seq` and claim its slot.
    pub fn set_state(&mut self, seq: u32, state: SlotState) {
        let slot = self.slot_mut(seq);
        slot.sequence = seq;
        slot.state = state;
    }

    /// Update the transmission time of `seq` if it owns its slot.
    pub fn set_tx_time(&mut self, seq: u32, now_ms: u64) {
        let slot = self.slot_mut(seq);
        if slot.sequence == seq {
            slot.tx_time = now_ms;
        }
    }

    /// Reset every slot to idle.
    pub fn clear(&mut self) {
        self.slots.fill(InflightSlot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation() {
        assert_eq!(SlotState::Sent.escalate(), SlotState::Timeout1);
        assert_eq!(SlotState::Timeout1.escalate(), SlotState::Timeout2);
        assert_eq!(SlotState::Timeout2.escalate(), SlotState::Lost);
        assert_eq!(SlotState::Received.escalate(), SlotState::Lost);

        assert!(SlotState::Timeout2.is_pending());
        assert!(!SlotState::Lost.is_pending());
    }

    #[test]
    fn test_mark_sent() {
        let mut ring = InflightRing::new(4);
        assert_eq!(ring.capacity(), 16);

        ring.mark_sent(3, 100);
        let slot = ring.owned(3).unwrap();
        assert_eq!(slot.state, SlotState::Sent);
        assert_eq!(slot.tx_time, 100);
        assert_eq!(ring.state_of(3), SlotState::Sent);
    }

    #[test]
    fn test_collision_overwrites() {
        let mut ring = InflightRing::new(4);
        ring.mark_sent(5, 100);
        ring.mark_sent(5 + 16, 200);

        // The newer sequence owns the slot; the older one reads as idle
        assert_eq!(ring.state_of(21), SlotState::Sent);
        assert_eq!(ring.state_of(5), SlotState::Idle);
        assert!(ring.owned(5).is_none());
        assert_eq!(ring.slot(5).sequence, 21);

        // Updating the displaced sequence's tx time leaves the slot alone
        ring.set_tx_time(5, 999);
        assert_eq!(ring.slot(21).tx_time, 200);
    }

    #[test]
    fn test_slot_exclusivity() {
        let mut ring = InflightRing::new(4);
        for seq in 0..64u32 {
            ring.mark_sent(seq, u64::from(seq));
        }

        // For every residue only the last writer is pending
        for seq in 0..64u32 {
            let pending = ring.state_of(seq).is_pending();
            assert_eq!(pending, seq >= 48, "seq {seq}");
        }
    }

    #[test]
    fn test_clear() {
        let mut ring = InflightRing::new(4);
        ring.mark_sent(1, 10);
        ring.set_state(2, SlotState::Received);
        ring.clear();
        assert_eq!(ring.state_of(1), SlotState::Idle);
        assert_eq!(ring.state_of(2), SlotState::Idle);
    }
}
