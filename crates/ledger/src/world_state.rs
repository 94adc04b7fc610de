// Path: crates/ledger/src/world_state.rs
//! `WorldState` (§3): balances, nonces, and cumulative emission. Owned
//! exclusively by the ledger; mutated only during block application.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use timpal_types::Address;

/// Balances, nonces, and cumulative minted supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    /// Current balance, in pals, per address. Absent entries are zero.
    pub balances: BTreeMap<Address, u128>,
    /// Next expected nonce per address. Absent entries are zero.
    pub nonces: BTreeMap<Address, u64>,
    /// Cumulative pals minted via block rewards (distinct from fees,
    /// which only move existing balance between accounts).
    pub total_emitted_pals: u128,
}

impl WorldState {
    /// `balances[address]`, or zero if absent.
    pub fn balance_of(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// `nonces[address]`, or zero if absent.
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Adds `amount` to `address`'s balance.
    pub fn credit(&mut self, address: &Address, amount: u128) {
        if amount == 0 {
            return;
        }
        *self.balances.entry(address.clone()).or_insert(0) += amount;
    }

    /// Subtracts `amount` from `address`'s balance, saturating at zero.
    /// Callers must have already validated sufficient balance; this never
    /// fails, since that invariant was checked at transaction admission.
    pub fn debit(&mut self, address: &Address, amount: u128) {
        let entry = self.balances.entry(address.clone()).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }

    /// Advances `address`'s nonce by one.
    pub fn advance_nonce(&mut self, address: &Address) {
        *self.nonces.entry(address.clone()).or_insert(0) += 1;
    }

    /// Records `amount` pals as newly minted.
    pub fn record_emission(&mut self, amount: u128) {
        self.total_emitted_pals = self.total_emitted_pals.saturating_add(amount);
    }
}
