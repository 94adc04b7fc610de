// Path: crates/consensus/src/vrf.rs
//! Deterministic epoch seed derivation and VRF-ordered proposer queues
//! (§4.6).

use std::collections::HashMap;
use timpal_crypto::sha256_hash256;
use timpal_types::{Address, Hash256};

/// Derives the epoch seed (§4.6):
/// `sha256("epoch_{e}_{finalized_block_hash}_{attestation_entropy}")`.
///
/// `attestation_entropy` is fixed empty network-wide (§9 Open Questions:
/// sufficient for determinism; documented as a deliberate, non-configurable
/// choice, not left open per-node).
pub fn epoch_seed(epoch: u64, finalized_block_hash: &Hash256) -> Hash256 {
    let preimage = format!("epoch_{epoch}_{finalized_block_hash}_");
    sha256_hash256(preimage.as_bytes())
}

/// Computes a committee member's VRF score for `height` within the epoch
/// that produced `seed`: `sha256("{seed}_{address}_{height}")`.
pub fn score(seed: &Hash256, address: &Address, height: u64) -> Hash256 {
    let preimage = format!("{seed}_{address}_{height}");
    sha256_hash256(preimage.as_bytes())
}

/// Orders `committee` into the proposer queue for `height`: ascending by
/// `(score, address)`. `queue[0]` is the primary proposer; `queue[r]` is
/// the rank-`r` fallback.
pub fn proposer_queue(seed: &Hash256, committee: &[Address], height: u64) -> Vec<Address> {
    let mut scored: Vec<(Hash256, Address)> = committee
        .iter()
        .map(|address| (score(seed, address, height), address.clone()))
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, address)| address).collect()
}

/// Caches the VRF proposer queue per slot so repeated fallback-rank
/// lookups for the same slot don't recompute the committee ordering.
#[derive(Debug, Default)]
pub struct VrfManager {
    cache: HashMap<u64, Vec<Address>>,
}

impl VrfManager {
    /// Builds an empty cache.
    pub fn new() -> Self {
        VrfManager::default()
    }

    /// Returns the proposer queue for `slot`, computing and caching it if
    /// absent.
    pub fn queue_for_slot(
        &mut self,
        slot: u64,
        seed: &Hash256,
        committee: &[Address],
    ) -> Vec<Address> {
        self.cache
            .entry(slot)
            .or_insert_with(|| proposer_queue(seed, committee, slot))
            .clone()
    }

    /// Drops cached queues for slots at or below `height`, typically
    /// called after a block at that height commits.
    pub fn evict_up_to(&mut self, height: u64) {
        self.cache.retain(|slot, _| *slot > height);
    }

    /// Drops cached queues for slots beyond `height`, discarding any
    /// ordering computed under a seed or committee the rollback just
    /// invalidated (§4.9 Rollback).
    pub fn rollback_to_height(&mut self, height: u64) {
        self.cache.retain(|slot, _| *slot <= height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("tmpl{}", hex::encode([n; 22]))).unwrap()
    }

    #[test]
    fn queue_is_permutation_of_committee() {
        let seed = epoch_seed(3, &Hash256::zero());
        let committee = vec![addr(1), addr(2), addr(3), addr(4)];
        let mut queue = proposer_queue(&seed, &committee, 300);
        queue.sort();
        let mut expected = committee.clone();
        expected.sort();
        assert_eq!(queue, expected);
    }

    #[test]
    fn queue_is_deterministic() {
        let seed = epoch_seed(3, &Hash256::zero());
        let committee = vec![addr(1), addr(2), addr(3)];
        assert_eq!(
            proposer_queue(&seed, &committee, 300),
            proposer_queue(&seed, &committee, 300)
        );
    }

    #[test]
    fn different_heights_can_reorder_queue() {
        let seed = epoch_seed(3, &Hash256::zero());
        let committee: Vec<Address> = (0..10).map(addr).collect();
        let q1 = proposer_queue(&seed, &committee, 300);
        let q2 = proposer_queue(&seed, &committee, 301);
        assert_ne!(q1, q2, "VRF score depends on height");
    }

    #[test]
    fn seed_depends_on_finalized_hash() {
        let a = epoch_seed(3, &Hash256::zero());
        let b = epoch_seed(3, &Hash256::from_bytes([9u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn manager_caches_queue_per_slot() {
        let mut mgr = VrfManager::new();
        let seed = epoch_seed(0, &Hash256::zero());
        let committee = vec![addr(1), addr(2)];
        let first = mgr.queue_for_slot(42, &seed, &committee);
        let second = mgr.queue_for_slot(42, &seed, &committee);
        assert_eq!(first, second);
        mgr.evict_up_to(42);
        assert!(mgr.cache.is_empty());
    }

    #[test]
    fn rollback_drops_only_future_slots() {
        let mut mgr = VrfManager::new();
        let seed = epoch_seed(0, &Hash256::zero());
        let committee = vec![addr(1), addr(2)];
        mgr.queue_for_slot(10, &seed, &committee);
        mgr.queue_for_slot(20, &seed, &committee);
        mgr.rollback_to_height(10);
        assert!(mgr.cache.contains_key(&10));
        assert!(!mgr.cache.contains_key(&20));
    }

    proptest! {
        #[test]
        fn queue_is_always_a_permutation(committee_size in 1usize..30, height in 0u64..1_000_000) {
            let seed = epoch_seed(7, &Hash256::zero());
            let committee: Vec<Address> = (0..committee_size).map(|n| addr(n as u8)).collect();
            let mut queue = proposer_queue(&seed, &committee, height);
            queue.sort();
            let mut expected = committee.clone();
            expected.sort();
            prop_assert_eq!(queue, expected);
        }

        #[test]
        fn queue_is_deterministic_across_calls(committee_size in 1usize..30, height in 0u64..1_000_000) {
            let seed = epoch_seed(7, &Hash256::zero());
            let committee: Vec<Address> = (0..committee_size).map(|n| addr(n as u8)).collect();
            prop_assert_eq!(
                proposer_queue(&seed, &committee, height),
                proposer_queue(&seed, &committee, height)
            );
        }
    }
}
