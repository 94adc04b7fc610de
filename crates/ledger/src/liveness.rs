// Path: crates/ledger/src/liveness.rs
//! The deterministic liveness filter and reward online-set (§4.9). Both
//! are derived only from on-chain signals — recent proposers, the
//! activation-grace window, and recent attestations — never from P2P
//! connection state, so every honest replica computes the same set.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use timpal_block::Block;
use timpal_consensus::AttestationManager;
use timpal_economics::ValidatorEntry;
use timpal_historical::LivenessFilterState;
use timpal_types::Address;

/// `L` in §4.9's liveness filter: the number of trailing blocks whose
/// proposers count as "recent".
pub fn lookback_blocks(active_validator_count: usize) -> u64 {
    30u64.max(active_validator_count as u64)
}

/// The activation-grace window: new validators are considered live for
/// this many blocks after `activation_height`, independent of proof.
pub fn grace_window_blocks(active_validator_count: usize) -> u64 {
    100u64.max(2 * active_validator_count as u64)
}

/// The set of addresses that proposed one of the last `lookback` blocks
/// at or below `current_height`.
pub fn recent_proposers(chain: &[Block], current_height: u64, lookback: u64) -> BTreeSet<Address> {
    let floor = current_height.saturating_sub(lookback);
    chain
        .iter()
        .filter(|b| b.height <= current_height && b.height > floor)
        .map(|b| b.proposer.clone())
        .collect()
}

/// Validators whose `activation_height` falls within `grace_window` of
/// `current_height`.
pub fn grace_period_validators(
    registry: &BTreeMap<Address, ValidatorEntry>,
    current_height: u64,
    grace_window: u64,
) -> BTreeSet<Address> {
    registry
        .values()
        .filter(|v| {
            v.activation_height <= current_height
                && current_height.saturating_sub(v.activation_height) < grace_window
        })
        .map(|v| v.address.clone())
        .collect()
}

/// Builds the combined liveness set (§4.9): recent proposers ∪
/// grace-period validators ∪ recently-attested validators; falls back
/// to every active validator in the registry if that union is empty.
pub fn liveness_filter(
    chain: &[Block],
    registry: &BTreeMap<Address, ValidatorEntry>,
    attestations: &AttestationManager,
    current_height: u64,
    current_epoch: u64,
) -> LivenessFilterState {
    let active_count = registry.values().filter(|v| v.is_active()).count();
    let lookback = lookback_blocks(active_count);
    let window = grace_window_blocks(active_count);

    let recent = recent_proposers(chain, current_height, lookback);
    let grace = grace_period_validators(registry, current_height, window);
    let attested: BTreeSet<Address> = registry
        .values()
        .filter(|v| attestations.attested_recently(&v.address, current_epoch))
        .map(|v| v.address.clone())
        .collect();

    let mut combined: BTreeSet<Address> = recent.union(&grace).cloned().collect();
    combined.extend(attested.iter().cloned());

    if combined.is_empty() {
        combined = registry
            .values()
            .filter(|v| v.is_active())
            .map(|v| v.address.clone())
            .collect();
    }

    LivenessFilterState {
        recent_proposers: recent,
        grace_period_validators: grace,
        combined_liveness_set: combined,
        lookback_blocks: lookback,
        grace_window_blocks: window,
    }
}

/// The online set used for reward allocation (§4.9): recent proposers
/// plus recently-attested validators, intersected with the active
/// registry. Deliberately narrower than the full liveness filter (no
/// fallback-to-all-active), since an empty online set burns the reward
/// rather than crediting validators who showed no recent signal.
pub fn reward_online_set(
    chain: &[Block],
    registry: &BTreeMap<Address, ValidatorEntry>,
    attestations: &AttestationManager,
    current_height: u64,
    current_epoch: u64,
) -> BTreeSet<Address> {
    let active_count = registry.values().filter(|v| v.is_active()).count();
    let lookback = lookback_blocks(active_count);
    let recent = recent_proposers(chain, current_height, lookback);
    let attested: BTreeSet<Address> = registry
        .values()
        .filter(|v| attestations.attested_recently(&v.address, current_epoch))
        .map(|v| v.address.clone())
        .collect();

    recent
        .union(&attested)
        .filter(|address| registry.get(*address).is_some_and(ValidatorEntry::is_active))
        .cloned()
        .collect()
}

/// Splits `total_reward` evenly across `online_set` (sorted by
/// address), distributing the integer-division remainder one unit at a
/// time in lexicographic address order.
pub fn allocate_rewards(
    online_set: &BTreeSet<Address>,
    total_reward: u128,
) -> BTreeMap<Address, u128> {
    let mut allocations = BTreeMap::new();
    if online_set.is_empty() || total_reward == 0 {
        return allocations;
    }
    let count = online_set.len() as u128;
    let share = total_reward / count;
    let mut remainder = (total_reward % count) as usize;

    for address in online_set {
        let mut amount = share;
        if remainder > 0 {
            amount += 1;
            remainder -= 1;
        }
        if amount > 0 {
            allocations.insert(address.clone(), amount);
        }
    }
    allocations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("tmpl{}", hex::encode([n; 22]))).unwrap()
    }

    #[test]
    fn reward_remainder_goes_to_earliest_addresses() {
        let set = BTreeSet::from([addr(1), addr(2), addr(3)]);
        let allocations = allocate_rewards(&set, 10);
        assert_eq!(allocations[&addr(1)], 4);
        assert_eq!(allocations[&addr(2)], 3);
        assert_eq!(allocations[&addr(3)], 3);
    }

    #[test]
    fn empty_online_set_allocates_nothing() {
        assert!(allocate_rewards(&BTreeSet::new(), 100).is_empty());
    }

    #[test]
    fn grace_window_scales_with_validator_count() {
        assert_eq!(grace_window_blocks(10), 100);
        assert_eq!(grace_window_blocks(100), 200);
    }
}
