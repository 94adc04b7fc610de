// Path: crates/economics/src/economics.rs
//! Deposit, slash, withdrawal, grace-transition, and redistribution
//! operations (§4.4). Pure computation is split from the thin stateful
//! wrapper so each rule is independently testable.

use crate::config::{EconomicsConfig, SlashReason};
use crate::validator::{ValidatorEntry, ValidatorStatus};
use std::collections::{BTreeMap, HashMap};
use timpal_types::error::EconomicsError;
use timpal_types::Address;
use tracing::info;

/// Owns the redistribution pool and applies the deposit/slash/withdrawal
/// rules against caller-supplied [`ValidatorEntry`] values. The registry
/// itself is owned by the ledger; this type is the rulebook, not the
/// store.
#[derive(Debug, Clone)]
pub struct ValidatorEconomics {
    config: EconomicsConfig,
    /// Slashed deposit awaiting redistribution to the live validator set.
    pending_redistribution: u128,
}

impl ValidatorEconomics {
    /// Builds a new economics rulebook with the given configuration and
    /// an empty redistribution pool.
    pub fn new(config: EconomicsConfig) -> Self {
        ValidatorEconomics {
            config,
            pending_redistribution: 0,
        }
    }

    /// The currently effective minimum deposit at `height`: zero before
    /// the grace transition, `min_deposit_pals` after.
    pub fn effective_min_deposit(&self, height: u64) -> u128 {
        if height >= self.config.grace_period_blocks {
            self.config.min_deposit_pals
        } else {
            0
        }
    }

    /// Locks `amount` as `entry`'s deposit. Used at registration and for
    /// voluntary top-ups.
    pub fn deposit(&self, entry: &mut ValidatorEntry, amount: u128) {
        entry.deposit_amount = entry.deposit_amount.saturating_add(amount);
    }

    /// Slashes `entry` for `reason`, moving the removed fraction into the
    /// redistribution pool. Returns the amount removed.
    pub fn slash(&mut self, entry: &mut ValidatorEntry, reason: SlashReason) -> u128 {
        let slashed = entry.deposit_amount.saturating_mul(reason.percent()) / 100;
        entry.deposit_amount = entry.deposit_amount.saturating_sub(slashed);
        entry.status = ValidatorStatus::Slashed;
        self.pending_redistribution = self.pending_redistribution.saturating_add(slashed);
        info!(
            target: "consensus",
            validator = %entry.address,
            ?reason,
            slashed,
            "validator slashed"
        );
        slashed
    }

    /// Records a withdrawal request at `height`. Fails if one is already
    /// pending.
    pub fn request_withdrawal(
        &self,
        entry: &mut ValidatorEntry,
        height: u64,
    ) -> Result<(), EconomicsError> {
        if entry.withdrawal_request_height.is_some() {
            return Err(EconomicsError::WithdrawalAlreadyPending);
        }
        entry.withdrawal_request_height = Some(height);
        Ok(())
    }

    /// Releases a pending withdrawal once `withdrawal_delay_blocks` have
    /// elapsed since the request. Returns the released amount and resets
    /// the entry to zero deposit, inactive status.
    pub fn process_withdrawal(
        &self,
        entry: &mut ValidatorEntry,
        current_height: u64,
    ) -> Result<u128, EconomicsError> {
        let requested_at = entry
            .withdrawal_request_height
            .ok_or(EconomicsError::WithdrawalDelayNotElapsed)?;
        if current_height < requested_at.saturating_add(self.config.withdrawal_delay_blocks) {
            return Err(EconomicsError::WithdrawalDelayNotElapsed);
        }
        let released = entry.deposit_amount;
        entry.deposit_amount = 0;
        entry.status = ValidatorStatus::Inactive;
        entry.withdrawal_request_height = None;
        Ok(released)
    }

    /// The one-time deposit-grace transition (§4.4): at exactly
    /// `grace_period_blocks`, every validator with sufficient balance and
    /// either `auto_lock_enabled` or a pre-scheduled deposit auto-locks
    /// `validator_deposit_pals`; the rest are marked inactive.
    pub fn apply_grace_transition(
        &self,
        entries: &mut HashMap<Address, ValidatorEntry>,
        balances: &HashMap<Address, u128>,
        height: u64,
        scheduled_deposits: &std::collections::HashSet<Address>,
    ) {
        if height != self.config.grace_period_blocks {
            return;
        }
        for entry in entries.values_mut() {
            if !entry.is_active() {
                continue;
            }
            let balance = balances.get(&entry.address).copied().unwrap_or(0);
            let will_lock = entry.auto_lock_enabled || scheduled_deposits.contains(&entry.address);
            if balance >= self.config.min_deposit_pals && will_lock {
                entry.deposit_amount = self.config.validator_deposit_pals.min(balance);
                info!(target: "consensus", validator = %entry.address, "deposit auto-locked at grace transition");
            } else {
                entry.status = ValidatorStatus::Inactive;
                info!(target: "consensus", validator = %entry.address, "validator marked inactive at grace transition");
            }
        }
    }

    /// Splits the redistribution pool evenly across `live_validators`
    /// (assumed already sorted by address), with the integer-division
    /// remainder burned. Drains the pool regardless of outcome.
    pub fn redistribute(&mut self, live_validators: &[Address]) -> BTreeMap<Address, u128> {
        let mut credits = BTreeMap::new();
        if self.pending_redistribution == 0 || live_validators.is_empty() {
            self.pending_redistribution = 0;
            return credits;
        }
        let share = self.pending_redistribution / live_validators.len() as u128;
        if share > 0 {
            for address in live_validators {
                credits.insert(address.clone(), share);
            }
        }
        self.pending_redistribution = 0;
        credits
    }

    /// The amount currently awaiting redistribution.
    pub fn pending_redistribution(&self) -> u128 {
        self.pending_redistribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use timpal_types::Address;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("tmpl{}", hex::encode([n; 22]))).unwrap()
    }

    fn entry(address: Address, deposit: u128) -> ValidatorEntry {
        ValidatorEntry {
            address,
            public_key: String::new(),
            device_id: "device".into(),
            status: ValidatorStatus::Active,
            registered_at: 0,
            registration_height: 0,
            activation_height: 2,
            deposit_amount: deposit,
            voting_power: deposit as u64,
            proposer_priority: 0,
            auto_lock_enabled: true,
            withdrawal_request_height: None,
        }
    }

    #[test]
    fn double_sign_slashes_full_deposit() {
        let mut econ = ValidatorEconomics::new(EconomicsConfig::default());
        let mut e = entry(addr(1), 1_000);
        let slashed = econ.slash(&mut e, SlashReason::DoubleSign);
        assert_eq!(slashed, 1_000);
        assert_eq!(e.deposit_amount, 0);
        assert_eq!(e.status, ValidatorStatus::Slashed);
        assert_eq!(econ.pending_redistribution(), 1_000);
    }

    #[test]
    fn invalid_block_slashes_half() {
        let mut econ = ValidatorEconomics::new(EconomicsConfig::default());
        let mut e = entry(addr(1), 1_000);
        let slashed = econ.slash(&mut e, SlashReason::InvalidBlock);
        assert_eq!(slashed, 500);
        assert_eq!(e.deposit_amount, 500);
    }

    #[test]
    fn withdrawal_requires_delay() {
        let econ = ValidatorEconomics::new(EconomicsConfig::default());
        let mut e = entry(addr(1), 1_000);
        econ.request_withdrawal(&mut e, 10).unwrap();
        assert!(econ.process_withdrawal(&mut e, 50).is_err());
        let released = econ.process_withdrawal(&mut e, 110).unwrap();
        assert_eq!(released, 1_000);
        assert_eq!(e.status, ValidatorStatus::Inactive);
    }

    #[test]
    fn cannot_request_withdrawal_twice() {
        let econ = ValidatorEconomics::new(EconomicsConfig::default());
        let mut e = entry(addr(1), 1_000);
        econ.request_withdrawal(&mut e, 10).unwrap();
        assert_eq!(
            econ.request_withdrawal(&mut e, 20).unwrap_err(),
            EconomicsError::WithdrawalAlreadyPending
        );
    }

    #[test]
    fn redistribution_splits_evenly_and_burns_remainder() {
        let mut econ = ValidatorEconomics::new(EconomicsConfig::default());
        let mut e = entry(addr(1), 100);
        econ.slash(&mut e, SlashReason::InvalidBlock); // pool = 50
        let validators = vec![addr(2), addr(3), addr(4)];
        let credits = econ.redistribute(&validators);
        assert_eq!(credits.values().copied().sum::<u128>(), 48); // 50/3=16 * 3
        assert_eq!(econ.pending_redistribution(), 0);
    }

    #[test]
    fn grace_transition_locks_or_deactivates() {
        let config = EconomicsConfig {
            grace_period_blocks: 100,
            ..EconomicsConfig::default()
        };
        let econ = ValidatorEconomics::new(config);
        let mut entries = HashMap::new();
        entries.insert(addr(1), entry(addr(1), 0));
        let mut poor = entry(addr(2), 0);
        poor.auto_lock_enabled = false;
        entries.insert(addr(2), poor);

        let mut balances = HashMap::new();
        balances.insert(addr(1), config.min_deposit_pals + 1);
        balances.insert(addr(2), 0);

        econ.apply_grace_transition(&mut entries, &balances, 100, &HashSet::new());

        assert!(entries.get(&addr(1)).unwrap().deposit_amount > 0);
        assert_eq!(entries.get(&addr(2)).unwrap().status, ValidatorStatus::Inactive);
    }

    proptest! {
        #[test]
        fn slash_never_exceeds_deposit(deposit in 0u128..1_000_000_000, reason_is_double_sign: bool) {
            let reason = if reason_is_double_sign { SlashReason::DoubleSign } else { SlashReason::InvalidBlock };
            let mut econ = ValidatorEconomics::new(EconomicsConfig::default());
            let mut e = entry(addr(1), deposit);
            let slashed = econ.slash(&mut e, reason);
            prop_assert!(slashed <= deposit);
            prop_assert_eq!(e.deposit_amount, deposit - slashed);
        }
    }
}
