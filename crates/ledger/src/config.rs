// Path: crates/ledger/src/config.rs
//! Ledger-level mainnet constants and the bundled configuration passed
//! to [`crate::Ledger::new`] (§4.9, §6).

use timpal_consensus::ConsensusConfig;
use timpal_economics::EconomicsConfig;
use timpal_types::Hash256;

/// Pals minted per block, before any remaining-emission cap.
pub const EMISSION_PER_BLOCK_PALS: u128 = 63_450_000;
/// Maximum total supply, in pals (`2.5e8 TMPL * 1e8 pals/TMPL`).
pub const MAX_SUPPLY_PALS: u128 = 250_000_000 * 100_000_000;
/// Heights at or below this skip the (slot, rank) window and proposer
/// checks, to let a fresh chain bootstrap before any committee exists.
pub const BOOTSTRAP_HEIGHT_LIMIT: u64 = 10;
/// Minimum online validator count below which the node refuses to
/// propose (§4.11 safety stop (b)).
pub const MIN_VALIDATORS_FOR_CONSENSUS: usize = 2;

/// Bundles the consensus and economics configuration the ledger needs,
/// plus the handful of constants that are the ledger's own.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Committee/epoch/fork-choice tunables.
    pub consensus: ConsensusConfig,
    /// Deposit/slash/withdrawal tunables.
    pub economics: EconomicsConfig,
    /// Pals minted per block before the remaining-emission cap.
    pub emission_per_block_pals: u128,
    /// Maximum total supply, in pals.
    pub max_supply_pals: u128,
    /// Maximum serialized block size, in bytes.
    pub max_block_size_bytes: usize,
    /// Maximum transactions per block.
    pub max_txs_per_block: usize,
    /// Maximum clock drift tolerated for a locally produced block.
    pub max_future_timestamp_drift_secs: u64,
    /// If set, genesis is only accepted when its block hash matches
    /// exactly (§4.9 check 4: "defeat eclipse attacks").
    pub canonical_genesis_hash: Option<Hash256>,
    /// Heights at or below this skip window/proposer checks.
    pub bootstrap_height_limit: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            consensus: ConsensusConfig::default(),
            economics: EconomicsConfig::default(),
            emission_per_block_pals: EMISSION_PER_BLOCK_PALS,
            max_supply_pals: MAX_SUPPLY_PALS,
            max_block_size_bytes: timpal_consensus::config::MAX_BLOCK_SIZE_BYTES,
            max_txs_per_block: timpal_consensus::config::MAX_TXS_PER_BLOCK,
            max_future_timestamp_drift_secs: timpal_consensus::config::MAX_FUTURE_TIMESTAMP_DRIFT_SECS,
            canonical_genesis_hash: None,
            bootstrap_height_limit: BOOTSTRAP_HEIGHT_LIMIT,
        }
    }
}
