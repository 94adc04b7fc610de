// Path: crates/economics/src/config.rs
//! Mainnet constants for validator economics (§4.4, §6).

/// Pals per TMPL token.
pub const PALS_PER_TMPL: u128 = 100_000_000;

/// The standard validator deposit: 100 TMPL.
pub const VALIDATOR_DEPOSIT_PALS: u128 = 100 * PALS_PER_TMPL;

/// The minimum deposit a validator must hold post-grace: 50 TMPL.
pub const MIN_DEPOSIT_PALS: u128 = 50 * PALS_PER_TMPL;

/// The height at which the one-time deposit-grace transition fires.
pub const GRACE_PERIOD_BLOCKS: u64 = 5_000_000;

/// Blocks a withdrawal request must wait before it can be processed.
pub const WITHDRAWAL_DELAY_BLOCKS: u64 = 100;

/// Integer percent of deposit slashed for double-signing (equivocation).
pub const SLASH_DOUBLE_SIGN_PERCENT: u128 = 100;

/// Integer percent of deposit slashed for proposing an invalid block.
pub const SLASH_INVALID_BLOCK_PERCENT: u128 = 50;

/// The reason a slash was applied, determining the slashed percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashReason {
    /// The validator double-signed (equivocated) at the same height/round.
    DoubleSign,
    /// The validator proposed a block that failed validation.
    InvalidBlock,
}

impl SlashReason {
    /// The integer percent of `deposit_amount` removed for this reason.
    pub fn percent(self) -> u128 {
        match self {
            SlashReason::DoubleSign => SLASH_DOUBLE_SIGN_PERCENT,
            SlashReason::InvalidBlock => SLASH_INVALID_BLOCK_PERCENT,
        }
    }
}

/// Runtime-tunable economics parameters, loaded from node configuration.
/// Defaults reproduce the mainnet constants above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EconomicsConfig {
    /// Deposit required for a fresh validator registration.
    pub validator_deposit_pals: u128,
    /// Minimum deposit enforced once the grace period has elapsed.
    pub min_deposit_pals: u128,
    /// Height of the one-time deposit-grace transition.
    pub grace_period_blocks: u64,
    /// Blocks a withdrawal must wait before release.
    pub withdrawal_delay_blocks: u64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        EconomicsConfig {
            validator_deposit_pals: VALIDATOR_DEPOSIT_PALS,
            min_deposit_pals: MIN_DEPOSIT_PALS,
            grace_period_blocks: GRACE_PERIOD_BLOCKS,
            withdrawal_delay_blocks: WITHDRAWAL_DELAY_BLOCKS,
        }
    }
}
