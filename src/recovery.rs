// src/recovery.rs
//! Per-security gap detection and snapshot recovery.
//!
//! Each security carries its own monotonic `rpt_seq`; several entries of one
//! incremental message may share a value. The manager decides, per entry,
//! whether the book may apply it. A sequence beyond the expected next value
//! parks the security in [`Phase::GapDetected`] until the snapshot feed
//! delivers a full image; incrementals arriving meanwhile are dropped, not
//! buffered, because the snapshot is authoritative. Recovery timeouts never
//! change phase; they only re-arm the timer and bump the attempt counter so
//! the condition stays visible in the logs.

use tracing::debug;

/// Recovery phase of one security.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Normal,
    GapDetected,
    Recovering,
}

/// Tracking state for one security.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityState {
    pub phase: Phase,
    /// Next unseen rpt_seq.
    pub expected_rpt_seq: u32,
    /// Highest rpt_seq applied to the book.
    pub last_good_rpt_seq: u32,
    /// rpt_seq of the snapshot being recovered to, when known.
    pub snapshot_rpt_seq: u32,
    /// Monotonic stamp of the first timeout check after a gap; zero until then.
    pub gap_detected_at: u64,
    pub recovery_attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub gaps_detected: u64,
    pub recoveries_completed: u64,
    pub messages_dropped: u64,
}

/// Recovery bookkeeping for every security on a channel.
#[derive(Default)]
pub struct RecoveryManager {
    states: hashbrown::HashMap<u32, SecurityState>,
    stats: RecoveryStats,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a security as if `initial_seq` were the next expected
    /// value.
    pub fn init_security(&mut self, security_id: u32, initial_seq: u32) {
        let state = self.states.entry(security_id).or_default();
        state.phase = Phase::Normal;
        state.expected_rpt_seq = initial_seq;
        state.last_good_rpt_seq = initial_seq.saturating_sub(1);
    }

    /// Decides whether an incremental entry may be applied to the book.
    pub fn on_incremental(&mut self, security_id: u32, rpt_seq: u32) -> bool {
        if !self.states.contains_key(&security_id) {
            // First sight of this security: adopt its stream where it is.
            self.init_security(security_id, rpt_seq.saturating_add(1));
            return true;
        }
        let state = self.states.get_mut(&security_id).unwrap();

        match state.phase {
            Phase::Normal => {
                if rpt_seq < state.last_good_rpt_seq {
                    // Duplicate or stale.
                    self.stats.messages_dropped += 1;
                    false
                } else if rpt_seq <= state.expected_rpt_seq {
                    if rpt_seq > state.last_good_rpt_seq {
                        state.last_good_rpt_seq = rpt_seq;
                        state.expected_rpt_seq = rpt_seq + 1;
                    }
                    true
                } else {
                    debug!(
                        security_id,
                        expected = state.expected_rpt_seq,
                        got = rpt_seq,
                        "rpt_seq gap"
                    );
                    state.phase = Phase::GapDetected;
                    state.gap_detected_at = 0;
                    state.recovery_attempts += 1;
                    self.stats.gaps_detected += 1;
                    false
                }
            }
            Phase::GapDetected | Phase::Recovering => {
                self.stats.messages_dropped += 1;
                false
            }
        }
    }

    /// Decides whether a snapshot should be applied to the book. The caller
    /// must follow a `true` with [`RecoveryManager::complete_recovery`] once
    /// the book holds the snapshot.
    pub fn on_snapshot(&mut self, security_id: u32, snapshot_rpt_seq: u32) -> bool {
        if !self.states.contains_key(&security_id) {
            self.init_security(security_id, snapshot_rpt_seq.saturating_add(1));
            return true;
        }
        let state = self.states.get_mut(&security_id).unwrap();

        match state.phase {
            // Up to date; periodic snapshots carry nothing new.
            Phase::Normal => false,
            Phase::GapDetected => {
                state.phase = Phase::Recovering;
                state.snapshot_rpt_seq = snapshot_rpt_seq;
                true
            }
            Phase::Recovering => {
                if snapshot_rpt_seq > state.snapshot_rpt_seq {
                    state.snapshot_rpt_seq = snapshot_rpt_seq;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Resumes incremental processing after a snapshot reached the book.
    pub fn complete_recovery(&mut self, security_id: u32, rpt_seq: u32) {
        if let Some(state) = self.states.get_mut(&security_id) {
            state.phase = Phase::Normal;
            state.expected_rpt_seq = rpt_seq.saturating_add(1);
            state.last_good_rpt_seq = rpt_seq;
            state.gap_detected_at = 0;
            self.stats.recoveries_completed += 1;
        }
    }

    /// Channel reset: every known security restarts at sequence one.
    pub fn channel_reset(&mut self) {
        for state in self.states.values_mut() {
            *state = SecurityState {
                phase: Phase::Normal,
                expected_rpt_seq: 1,
                last_good_rpt_seq: 0,
                ..SecurityState::default()
            };
        }
    }

    /// True while any security is waiting on the snapshot feed. The transport
    /// must keep reading that feed whenever this holds.
    pub fn needs_recovery(&self) -> bool {
        self.states.values().any(|s| s.phase != Phase::Normal)
    }

    pub fn phase(&self, security_id: u32) -> Phase {
        self.states
            .get(&security_id)
            .map_or(Phase::Normal, |s| s.phase)
    }

    pub fn state(&self, security_id: u32) -> Option<&SecurityState> {
        self.states.get(&security_id)
    }

    pub fn recovering(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|(_, s)| s.phase != Phase::Normal)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Sweeps non-Normal securities. A security seen for the first time since
    /// its gap is stamped with `now`; one whose timer exceeded `timeout_ns`
    /// has the timer re-armed, its attempt counter bumped, and its id returned
    /// for logging. Phase never changes here.
    pub fn check_timeouts(&mut self, now: u64, timeout_ns: u64) -> Vec<u32> {
        let mut timed_out = Vec::new();
        for (&id, state) in self.states.iter_mut() {
            if state.phase == Phase::Normal {
                continue;
            }
            if state.gap_detected_at == 0 {
                state.gap_detected_at = now;
            } else if now - state.gap_detected_at > timeout_ns {
                state.recovery_attempts += 1;
                state.gap_detected_at = now;
                timed_out.push(id);
            }
        }
        timed_out
    }

    pub fn stats(&self) -> RecoveryStats {
        self.stats
    }
}
