// Path: crates/node/src/sync.rs
//! The sync phase machine (§4.11 step ii).
//!
//! A node's relationship to the network's best known height moves
//! through three phases:
//!
//! - `Syncing`: local height trails the best known peer height by more
//!   than [`SyncPhases::lag_threshold`]. The node pulls blocks but does
//!   not propose.
//! - `Cooling`: local height has caught up; the node waits
//!   `sync_cooling_blocks` further blocks before trusting itself to
//!   propose, so a peer who was itself still catching up doesn't drag
//!   this node back into a lag immediately after promotion.
//! - `Active`: the node participates in proposing and attesting.
//!
//! A severe lag (`>= severe_lag_threshold`) drops a node straight back
//! to `Syncing` from any phase, including `Active` — a node that falls
//! far behind mid-operation (e.g. after a long GC pause) should not
//! keep proposing against a chain it no longer has the tip of.
//!
//! A stall timer guards against the case where the node is "caught up"
//! to the last height it ever heard of, but the network itself has
//! stalled (no new blocks from anyone): without it, a node stuck in
//! `Cooling` waiting for `sync_cooling_blocks` more blocks that will
//! never arrive would never promote to `Active`.

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The node's current relationship to the network tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Syncing,
    Cooling { remaining: u64 },
    Active,
}

/// Tunable thresholds driving [`SyncPhase`] transitions, taken from
/// [`crate::config::NodeConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SyncThresholds {
    pub lag_threshold: u64,
    pub severe_lag_threshold: u64,
    pub cooling_blocks: u64,
    /// How long the phase machine waits, with no height progress at
    /// all from any peer, before treating the network itself as
    /// stalled and promoting straight to `Active` rather than waiting
    /// out a cooling period that will never resolve.
    pub stall_timeout: Duration,
}

/// Drives [`SyncPhase`] transitions as local and peer heights change.
pub struct SyncMachine {
    thresholds: SyncThresholds,
    phase: SyncPhase,
    last_height_seen: u64,
    last_progress_at: Instant,
}

impl SyncMachine {
    pub fn new(thresholds: SyncThresholds, local_height: u64) -> Self {
        SyncMachine {
            thresholds,
            phase: SyncPhase::Syncing,
            last_height_seen: local_height,
            last_progress_at: Instant::now(),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, SyncPhase::Active)
    }

    /// Call once per consensus-loop tick with the latest local height
    /// and the highest height known from any reachable peer.
    pub fn tick(&mut self, local_height: u64, max_peer_height: u64) -> SyncPhase {
        if local_height > self.last_height_seen {
            self.last_height_seen = local_height;
            self.last_progress_at = Instant::now();
        }

        let lag = max_peer_height.saturating_sub(local_height);

        if lag >= self.thresholds.severe_lag_threshold {
            if !matches!(self.phase, SyncPhase::Syncing) {
                info!(lag, "severe lag detected, dropping to syncing");
            }
            self.phase = SyncPhase::Syncing;
            return self.phase;
        }

        self.phase = match self.phase {
            SyncPhase::Syncing => {
                if lag <= self.thresholds.lag_threshold {
                    debug!(lag, "caught up, entering cooling");
                    SyncPhase::Cooling {
                        remaining: self.thresholds.cooling_blocks,
                    }
                } else {
                    SyncPhase::Syncing
                }
            }
            SyncPhase::Cooling { remaining } => {
                if lag > self.thresholds.lag_threshold {
                    SyncPhase::Syncing
                } else if self.network_stalled() {
                    info!("network appears stalled, promoting to active without finishing cooling");
                    SyncPhase::Active
                } else if remaining == 0 {
                    info!("cooling period complete, promoting to active");
                    SyncPhase::Active
                } else {
                    SyncPhase::Cooling {
                        remaining: remaining - 1,
                    }
                }
            }
            SyncPhase::Active => {
                if lag > self.thresholds.lag_threshold {
                    SyncPhase::Syncing
                } else {
                    SyncPhase::Active
                }
            }
        };
        self.phase
    }

    fn network_stalled(&self) -> bool {
        self.last_progress_at.elapsed() >= self.thresholds.stall_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> SyncThresholds {
        SyncThresholds {
            lag_threshold: 5,
            severe_lag_threshold: 10,
            cooling_blocks: 2,
            stall_timeout: Duration::from_secs(3600),
        }
    }

    #[test]
    fn starts_syncing_and_promotes_through_cooling() {
        let mut machine = SyncMachine::new(thresholds(), 0);
        assert_eq!(machine.tick(0, 20), SyncPhase::Syncing);
        assert_eq!(
            machine.tick(16, 20),
            SyncPhase::Cooling { remaining: 2 }
        );
        assert_eq!(machine.tick(17, 20), SyncPhase::Cooling { remaining: 1 });
        assert_eq!(machine.tick(18, 20), SyncPhase::Cooling { remaining: 0 });
        assert_eq!(machine.tick(19, 20), SyncPhase::Active);
    }

    #[test]
    fn severe_lag_drops_active_node_back_to_syncing() {
        let mut machine = SyncMachine::new(thresholds(), 0);
        assert_eq!(machine.tick(16, 18), SyncPhase::Cooling { remaining: 2 });
        assert_eq!(machine.tick(17, 18), SyncPhase::Cooling { remaining: 1 });
        assert_eq!(machine.tick(18, 18), SyncPhase::Cooling { remaining: 0 });
        assert_eq!(machine.tick(19, 18), SyncPhase::Active);
        assert_eq!(machine.tick(19, 40), SyncPhase::Syncing);
    }

    #[test]
    fn stalled_network_promotes_without_finishing_cooling() {
        let mut fast_thresholds = thresholds();
        fast_thresholds.stall_timeout = Duration::from_secs(0);
        fast_thresholds.cooling_blocks = 1000;
        let mut machine = SyncMachine::new(fast_thresholds, 0);
        assert_eq!(
            machine.tick(10, 12),
            SyncPhase::Cooling { remaining: 1000 }
        );
        assert_eq!(machine.tick(10, 12), SyncPhase::Active);
    }
}
