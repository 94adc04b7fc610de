// Path: crates/historical/src/frame.rs
//! `ValidatorStateFrame`: the per-height validator-set snapshot (§3, §4.8).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use timpal_economics::ValidatorEntry;
use timpal_types::{Address, Hash256};

/// How often a full (non-delta) frame is written, absent an epoch
/// boundary forcing one.
pub const FULL_FRAME_INTERVAL: u64 = 100;

/// The inputs to the liveness filter (§4.9) captured at a given height,
/// so proposer eligibility during reorg validation never needs to
/// recompute it from current registry/attestation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessFilterState {
    /// Validators that proposed one of the last `lookback_blocks` blocks.
    pub recent_proposers: BTreeSet<Address>,
    /// Validators whose `activation_height` falls within the grace window.
    pub grace_period_validators: BTreeSet<Address>,
    /// The union actually used to select the committee/proposer set.
    pub combined_liveness_set: BTreeSet<Address>,
    /// `L` used for `recent_proposers` at the time this was captured.
    pub lookback_blocks: u64,
    /// The grace-window width used for `grace_period_validators`.
    pub grace_window_blocks: u64,
}

/// A per-height snapshot of everything needed to recompute the proposer
/// queue for that height independent of current ledger state.
///
/// `ordered_validators` holds the full registry, sorted by address, on a
/// full frame; it is empty on a delta frame, whose `diff` instead lists
/// the entries that changed relative to the parent frame. The log
/// itself does not resolve deltas against their parent chain — the
/// ledger's rollback path always restores from the nearest full frame at
/// or below the target height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStateFrame {
    /// Height this frame was captured at.
    pub block_height: u64,
    /// Hash of the block at `block_height`.
    pub block_hash: Hash256,
    /// Whether this is a full frame (every 100 blocks and at epoch
    /// boundaries) or a delta frame.
    pub is_full_frame: bool,
    /// The complete, address-sorted validator list. Populated only when
    /// `is_full_frame` is true.
    pub ordered_validators: Vec<ValidatorEntry>,
    /// Validators that changed relative to the parent frame. Populated
    /// only when `is_full_frame` is false.
    pub diff: Vec<ValidatorEntry>,
    /// The liveness-filter inputs captured at this height.
    pub liveness_filter_state: LivenessFilterState,
    /// The epoch seed in effect at this height.
    pub epoch_seed: Hash256,
    /// The epoch number in effect at this height.
    pub epoch_number: u64,
}

impl ValidatorStateFrame {
    /// Whether `height` must be written as a full frame: every
    /// [`FULL_FRAME_INTERVAL`] blocks, or at an epoch boundary.
    pub fn requires_full_frame(height: u64, epoch_length: u64) -> bool {
        height % FULL_FRAME_INTERVAL == 0 || (epoch_length > 0 && height % epoch_length == 0)
    }

    /// Builds a full frame.
    #[allow(clippy::too_many_arguments)]
    pub fn full(
        block_height: u64,
        block_hash: Hash256,
        mut ordered_validators: Vec<ValidatorEntry>,
        liveness_filter_state: LivenessFilterState,
        epoch_seed: Hash256,
        epoch_number: u64,
    ) -> Self {
        ordered_validators.sort_by(|a, b| a.address.cmp(&b.address));
        ValidatorStateFrame {
            block_height,
            block_hash,
            is_full_frame: true,
            ordered_validators,
            diff: Vec::new(),
            liveness_filter_state,
            epoch_seed,
            epoch_number,
        }
    }

    /// Builds a delta frame carrying only the validators that changed
    /// relative to the parent.
    #[allow(clippy::too_many_arguments)]
    pub fn delta(
        block_height: u64,
        block_hash: Hash256,
        mut diff: Vec<ValidatorEntry>,
        liveness_filter_state: LivenessFilterState,
        epoch_seed: Hash256,
        epoch_number: u64,
    ) -> Self {
        diff.sort_by(|a, b| a.address.cmp(&b.address));
        ValidatorStateFrame {
            block_height,
            block_hash,
            is_full_frame: false,
            ordered_validators: Vec::new(),
            diff,
            liveness_filter_state,
            epoch_seed,
            epoch_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_required_on_interval_and_epoch_boundary() {
        assert!(ValidatorStateFrame::requires_full_frame(100, 100));
        assert!(ValidatorStateFrame::requires_full_frame(300, 150));
        assert!(!ValidatorStateFrame::requires_full_frame(101, 150));
    }

    #[test]
    fn full_frame_sorts_validators_by_address() {
        let frame = ValidatorStateFrame::full(
            100,
            Hash256::zero(),
            Vec::new(),
            LivenessFilterState {
                recent_proposers: BTreeSet::new(),
                grace_period_validators: BTreeSet::new(),
                combined_liveness_set: BTreeSet::new(),
                lookback_blocks: 30,
                grace_window_blocks: 100,
            },
            Hash256::zero(),
            1,
        );
        assert!(frame.is_full_frame);
        assert!(frame.ordered_validators.is_empty());
    }
}
