//! Per-path delay statistics.
//!
//! Every content object carries a path label naming the forwarding path it
//! traversed. The controller keeps one [`PathStats`] per label and, once per
//! round, picks the fastest and slowest active paths to drive retransmission
//! timing and window sizing.

use std::collections::{BTreeMap, VecDeque};

use crate::core::{MAX_ROUNDS_WITHOUT_SAMPLES, PATH_ALPHA, PATH_HISTORY_ROUNDS};

/// Delay statistics for a single forwarding path.
///
/// RTT and one-way delay are tracked as per-round minima kept over a sliding
/// window of rounds. Latencies are in milliseconds; negative samples (clock
/// skew between producer and consumer) are clamped to zero.
#[derive(Debug, Clone)]
pub struct PathStats {
    /// Minimum RTT seen in the current round.
    round_min_rtt: Option<u64>,
    /// Per-round minimum RTTs, oldest first.
    rtt_history: VecDeque<u64>,
    /// Minimum OWD seen in the current round.
    round_min_owd: Option<f64>,
    /// Per-round minimum OWDs, oldest first.
    owd_history: VecDeque<f64>,
    /// Smoothed OWD.
    avg_owd: Option<f64>,
    /// Queuing delay derived at the last round end.
    queuing_delay: f64,

    /// Highest sequence seen for inter-arrival measurement.
    last_seq: Option<u32>,
    /// Arrival time of `last_seq`.
    last_arrival_ms: u64,
    /// Smoothed gap between in-sequence arrivals.
    inter_arrival_gap: Option<f64>,

    /// NACKs received over this path.
    received_nacks: u32,
    /// Whether anything arrived over this path in the current round.
    sampled_this_round: bool,
    /// Whether anything ever arrived over this path.
    ever_sampled: bool,
    /// Consecutive rounds with no arrivals.
    rounds_without_samples: u32,
}

impl Default for PathStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStats {
    /// Create an empty path.
    pub fn new() -> Self {
        Self {
            round_min_rtt: None,
            rtt_history: VecDeque::with_capacity(PATH_HISTORY_ROUNDS),
            round_min_owd: None,
            owd_history: VecDeque::with_capacity(PATH_HISTORY_ROUNDS),
            avg_owd: None,
            queuing_delay: 0.0,
            last_seq: None,
            last_arrival_ms: 0,
            inter_arrival_gap: None,
            received_nacks: 0,
            sampled_this_round: false,
            ever_sampled: false,
            rounds_without_samples: 0,
        }
    }

    /// Record an RTT sample (ms).
    pub fn insert_rtt_sample(&mut self, rtt: i64) {
        let rtt = rtt.max(0) as u64;
        self.round_min_rtt = Some(self.round_min_rtt.map_or(rtt, |min| min.min(rtt)));
        self.mark_sampled();
    }

    /// Record a one-way delay sample (ms).
    pub fn insert_owd_sample(&mut self, owd: i64) {
        let owd = owd.max(0) as f64;
        self.round_min_owd = Some(self.round_min_owd.map_or(owd, |min| min.min(owd)));
        self.avg_owd = Some(match self.avg_owd {
            Some(avg) => (1.0 - PATH_ALPHA) * avg + PATH_ALPHA * owd,
            None => owd,
        });
        self.mark_sampled();
    }

    /// Update the inter-arrival gap with the arrival of `seq` at `now_ms`.
    ///
    /// Only back-to-back sequences contribute a gap sample. Reordered
    /// arrivals below the highest sequence seen are ignored.
    pub fn compute_inter_arrival_gap(&mut self, seq: u32, now_ms: u64) {
        match self.last_seq {
            Some(last) if seq == last.wrapping_add(1) => {
                let delta = now_ms.saturating_sub(self.last_arrival_ms) as f64;
                self.inter_arrival_gap = Some(match self.inter_arrival_gap {
                    Some(gap) => (1.0 - PATH_ALPHA) * gap + PATH_ALPHA * delta,
                    None => delta,
                });
            }
            Some(last) if seq < last => return,
            _ => {}
        }
        self.last_seq = Some(seq);
        self.last_arrival_ms = now_ms;
    }

    /// Record a NACK received over this path.
    pub fn received_nack(&mut self) {
        self.received_nacks = self.received_nacks.saturating_add(1);
        self.mark_sampled();
    }

    /// Close the current round.
    ///
    /// Pushes the round minima into the history (an empty round repeats the
    /// previous minimum), recomputes the queuing delay and resets the
    /// per-round accumulators. Smoothed values are kept.
    pub fn round_end(&mut self) {
        let rtt = self.round_min_rtt.take().or(self.rtt_history.back().copied());
        if let Some(rtt) = rtt {
            // A zero RTT would make the path look infinitely fast.
            push_bounded(&mut self.rtt_history, rtt.max(1));
        }

        let owd = self.round_min_owd.take().or(self.owd_history.back().copied());
        if let Some(owd) = owd {
            push_bounded(&mut self.owd_history, owd);
        }

        self.queuing_delay = match (self.avg_owd, self.min_owd()) {
            (Some(avg), Some(min)) => (avg - min).max(0.0),
            _ => 0.0,
        };

        if self.sampled_this_round {
            self.rounds_without_samples = 0;
        } else {
            self.rounds_without_samples = self.rounds_without_samples.saturating_add(1);
        }
        self.sampled_this_round = false;
    }

    /// Whether the path carried traffic recently.
    pub fn is_active(&self) -> bool {
        self.ever_sampled && self.rounds_without_samples < MAX_ROUNDS_WITHOUT_SAMPLES
    }

    /// Minimum RTT over the history window, 0 if none was recorded yet.
    pub fn min_rtt(&self) -> u64 {
        self.rtt_history.iter().copied().min().unwrap_or(0)
    }

    /// Queuing delay computed at the last round end (never negative).
    pub fn queuing_delay(&self) -> f64 {
        self.queuing_delay
    }

    /// Smoothed inter-arrival gap, 0 if unknown.
    pub fn inter_arrival_gap(&self) -> f64 {
        self.inter_arrival_gap.unwrap_or(0.0)
    }

    /// Number of NACKs received over this path.
    pub fn received_nacks(&self) -> u32 {
        self.received_nacks
    }

    fn min_owd(&self) -> Option<f64> {
        self.owd_history.iter().copied().reduce(f64::min)
    }

    fn mark_sampled(&mut self) {
        self.sampled_this_round = true;
        self.ever_sampled = true;
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T) {
    if history.len() == PATH_HISTORY_ROUNDS {
        history.pop_front();
    }
    history.push_back(value);
}

/// All paths observed by a consumer, keyed by path label.
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    paths: BTreeMap<u32, PathStats>,
}

impl PathTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for `label`, created on first use.
    pub fn entry(&mut self, label: u32) -> &mut PathStats {
        self.paths.entry(label).or_default()
    }

    /// Stats for `label`, if the path was seen.
    pub fn get(&self, label: u32) -> Option<&PathStats> {
        self.paths.get(&label)
    }

    /// Whether `label` was seen.
    pub fn contains(&self, label: u32) -> bool {
        self.paths.contains_key(&label)
    }

    /// Number of known paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path was seen yet.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Close the round on every path.
    pub fn round_end(&mut self) {
        for path in self.paths.values_mut() {
            path.round_end();
        }
    }

    /// Labels of the active paths with the smallest and largest minimum RTT.
    ///
    /// Ties go to the lowest label. `None` when no path is active.
    pub fn fastest_and_slowest(&self) -> Option<(u32, u32)> {
        let mut fastest: Option<(u32, u64)> = None;
        let mut slowest: Option<(u32, u64)> = None;

        for (&label, path) in self.paths.iter().filter(|(_, p)| p.is_active()) {
            let rtt = path.min_rtt();
            if fastest.is_none_or(|(_, min)| rtt < min) {
                fastest = Some((label, rtt));
            }
            if slowest.is_none_or(|(_, max)| rtt > max) {
                slowest = Some((label, rtt));
            }
        }

        match (fastest, slowest) {
            (Some((fast, _)), Some((slow, _))) => Some((fast, slow)),
            _ => None,
        }
    }

    /// Forget every path.
    pub fn clear(&mut self) {
        self.paths.clear();
    }
}
