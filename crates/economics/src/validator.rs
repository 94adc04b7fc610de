// Path: crates/economics/src/validator.rs
//! The validator registry entry (§3: `ValidatorEntry`).

use serde::{Deserialize, Serialize};
use timpal_types::Address;

/// The lifecycle status of a registered validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    /// Registered but not yet past `activation_height`.
    Pending,
    /// Active in the validator set; eligible to propose and attest.
    Active,
    /// A genesis validator, active from height 0.
    Genesis,
    /// Deactivated: either withdrawn or failed the deposit-grace transition.
    Inactive,
    /// Penalized for equivocation or proposing an invalid block.
    Slashed,
}

/// An entry in the validator registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    /// The validator's address.
    pub address: Address,
    /// Uncompressed SEC1 public key, hex-encoded.
    pub public_key: String,
    /// Opaque per-device identifier bound at registration.
    pub device_id: String,
    /// Current lifecycle status.
    pub status: ValidatorStatus,
    /// Unix timestamp of registration.
    pub registered_at: u64,
    /// Chain height at which the registration transaction was applied.
    pub registration_height: u64,
    /// Height at which the validator joins the active set
    /// (`registration_height + 2`, or 0 for genesis validators).
    pub activation_height: u64,
    /// Currently locked deposit, in pals.
    pub deposit_amount: u128,
    /// Voting power, used for quorum and reward-allocation weighting.
    pub voting_power: u64,
    /// Running proposer-priority counter (Tendermint-style round robin
    /// tiebreak across the liveness-filtered proposer set).
    pub proposer_priority: i64,
    /// Whether this validator should auto-lock its deposit at the grace
    /// transition if its balance covers it. Defaults to `true`.
    pub auto_lock_enabled: bool,
    /// Height at which a withdrawal was requested, if any.
    pub withdrawal_request_height: Option<u64>,
}

impl ValidatorEntry {
    /// Whether this validator counts toward the active set for proposer
    /// selection and reward allocation.
    pub fn is_active(&self) -> bool {
        matches!(self.status, ValidatorStatus::Active | ValidatorStatus::Genesis)
    }
}
