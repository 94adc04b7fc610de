// Path: crates/consensus/src/fork_choice.rs
//! Chain-weight comparison, finality checkpoints, and bounded,
//! economically-gated reorg (§4.7).

use crate::config::ConsensusConfig;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use timpal_types::error::ConsensusError;
use timpal_types::Hash256;

/// Per-block weight. A constant so chain weight reduces to block count —
/// "prevents grinding" by giving timestamp manipulation no leverage.
pub const WEIGHT_PER_BLOCK: u64 = 1;

/// The comparable summary of a candidate chain at its tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSummary {
    /// Number of blocks in the chain.
    pub length: u64,
    /// Timestamp of the block at the fork point (the first block where
    /// the two chains diverge).
    pub fork_point_timestamp: u64,
    /// Hash of the tip block.
    pub tip_hash: Hash256,
}

impl ChainSummary {
    /// Total chain weight: `length * WEIGHT_PER_BLOCK`.
    pub fn weight(&self) -> u64 {
        self.length.saturating_mul(WEIGHT_PER_BLOCK)
    }
}

/// Compares two chains per the rule set in §4.7, in order: weight, then
/// length, then earlier fork-point timestamp, then lexicographically
/// smaller tip hash. Returns `Greater` if `a` wins over `b`.
pub fn compare_chains(a: &ChainSummary, b: &ChainSummary) -> Ordering {
    a.weight()
        .cmp(&b.weight())
        .then_with(|| a.length.cmp(&b.length))
        .then_with(|| b.fork_point_timestamp.cmp(&a.fork_point_timestamp))
        .then_with(|| b.tip_hash.cmp(&a.tip_hash))
}

/// Tracks finality checkpoints and gates reorgs against them.
#[derive(Debug, Clone, Default)]
pub struct ForkChoice {
    config: Option<ConsensusConfig>,
    /// Height -> tip hash recorded as finalized at that height.
    checkpoints: BTreeMap<u64, Hash256>,
}

impl ForkChoice {
    /// Builds a fork-choice tracker under `config`.
    pub fn new(config: ConsensusConfig) -> Self {
        ForkChoice {
            config: Some(config),
            checkpoints: BTreeMap::new(),
        }
    }

    fn config(&self) -> ConsensusConfig {
        self.config.unwrap_or_default()
    }

    /// Records `tip_hash` as finalized at `height`, if `height` lands on
    /// the checkpoint interval.
    pub fn maybe_checkpoint(&mut self, height: u64, tip_hash: Hash256) {
        if height % self.config().finality_checkpoint_interval == 0 {
            self.checkpoints.insert(height, tip_hash);
        }
    }

    /// The most recently recorded checkpoint height, if any.
    pub fn latest_checkpoint_height(&self) -> Option<u64> {
        self.checkpoints.keys().next_back().copied()
    }

    /// Deletes checkpoints recorded strictly above `height`, mirroring a
    /// historical-state rollback.
    pub fn rollback_to_height(&mut self, height: u64) {
        self.checkpoints.retain(|h, _| *h <= height);
    }

    /// Validates a reorg from `fork_height` against `local_length` to
    /// `competing_length`. Applies, in order: the finality-checkpoint
    /// gate, the depth limit, and (for deep reorgs outside the grace
    /// period) the 51%-style economic gate.
    ///
    /// `attacking_branch_balance` is the sum of balances held by
    /// proposers on the competing branch after the fork point;
    /// `max_supply` is `MAX_SUPPLY_PALS`; `in_grace_period` suppresses the
    /// economic gate while the network's circulating supply is too small
    /// for it to bind meaningfully.
    pub fn validate_reorg(
        &self,
        fork_height: u64,
        local_length: u64,
        competing_length: u64,
        attacking_branch_balance: u128,
        max_supply: u128,
        in_grace_period: bool,
    ) -> Result<(), ConsensusError> {
        let depth = local_length.saturating_sub(fork_height);
        let advantage = competing_length.saturating_sub(local_length);

        if let Some(checkpoint_height) = self.latest_checkpoint_height() {
            if fork_height < checkpoint_height
                && advantage < self.config().network_recovery_threshold
            {
                return Err(ConsensusError::PastFinalityCheckpoint);
            }
        }

        if depth > self.config().max_reorg_depth
            && advantage < self.config().network_recovery_threshold
        {
            return Err(ConsensusError::ReorgTooDeep { depth });
        }

        if depth >= self.config().reorg_attack_threshold && !in_grace_period {
            let coin_attack_threshold = max_supply.saturating_mul(51) / 100;
            if attacking_branch_balance < coin_attack_threshold {
                return Err(ConsensusError::InsufficientAttackStake);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(length: u64, ts: u64, hash_byte: u8) -> ChainSummary {
        ChainSummary {
            length,
            fork_point_timestamp: ts,
            tip_hash: Hash256::from_bytes([hash_byte; 32]),
        }
    }

    #[test]
    fn longer_chain_wins() {
        let a = summary(200, 100, 1);
        let b = summary(210, 100, 1);
        assert_eq!(compare_chains(&b, &a), Ordering::Greater);
    }

    #[test]
    fn equal_length_prefers_earlier_fork_timestamp() {
        let a = summary(200, 50, 1);
        let b = summary(200, 100, 1);
        assert_eq!(compare_chains(&a, &b), Ordering::Greater);
    }

    #[test]
    fn equal_everything_but_hash_prefers_smaller_hash() {
        let a = summary(200, 100, 1);
        let b = summary(200, 100, 9);
        assert_eq!(compare_chains(&a, &b), Ordering::Greater);
    }

    #[test]
    fn reorg_within_bounds_is_accepted() {
        let fc = ForkChoice::new(ConsensusConfig::default());
        assert!(fc.validate_reorg(150, 200, 210, 0, 0, true).is_ok());
    }

    #[test]
    fn reorg_past_max_depth_without_recovery_is_rejected() {
        let fc = ForkChoice::new(ConsensusConfig::default());
        let err = fc.validate_reorg(100, 200, 205, 0, 0, true).unwrap_err();
        assert_eq!(err, ConsensusError::ReorgTooDeep { depth: 100 });
    }

    #[test]
    fn reorg_past_max_depth_with_recovery_advantage_is_accepted() {
        let fc = ForkChoice::new(ConsensusConfig::default());
        assert!(fc.validate_reorg(100, 200, 310, 0, 0, true).is_ok());
    }

    #[test]
    fn reorg_crossing_checkpoint_without_recovery_is_rejected() {
        let mut fc = ForkChoice::new(ConsensusConfig::default());
        fc.maybe_checkpoint(200, Hash256::zero());
        let err = fc
            .validate_reorg(190, 200, 280, 0, 0, true)
            .unwrap_err();
        assert_eq!(err, ConsensusError::PastFinalityCheckpoint);
    }

    #[test]
    fn deep_reorg_outside_grace_requires_economic_majority() {
        let fc = ForkChoice::new(ConsensusConfig::default());
        let err = fc
            .validate_reorg(190, 200, 205, 0, 1_000_000, false)
            .unwrap_err();
        assert_eq!(err, ConsensusError::InsufficientAttackStake);
        assert!(fc
            .validate_reorg(190, 200, 205, 600_000, 1_000_000, false)
            .is_ok());
    }
}
