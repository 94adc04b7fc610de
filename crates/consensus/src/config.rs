// Path: crates/consensus/src/config.rs
//! Mainnet consensus constants (§6).

/// Seconds between blocks.
pub const BLOCK_TIME_SECS: u64 = 3;
/// Blocks per epoch.
pub const EPOCH_LENGTH: u64 = 100;
/// Blocks in a committee's attestation window.
pub const ATTESTATION_WINDOW: u64 = 100;
/// Maximum committee size.
pub const COMMITTEE_SIZE: usize = 1_000;
/// Minimum fraction of committee voting power required for quorum.
pub const MIN_COMMITTEE_PARTICIPATION: f64 = 0.67;
/// Blocks between finality checkpoints.
pub const FINALITY_CHECKPOINT_INTERVAL: u64 = 100;
/// Maximum reorg depth absent a network-recovery advantage.
pub const MAX_REORG_DEPTH: u64 = 80;
/// Competing-chain length advantage required to cross a finality checkpoint.
pub const NETWORK_RECOVERY_THRESHOLD: u64 = 100;
/// Reorg depth at which the 51%-style economic gate engages.
pub const REORG_ATTACK_THRESHOLD: u64 = 4;
/// Maximum allowed clock drift for a locally produced block's timestamp.
pub const MAX_FUTURE_TIMESTAMP_DRIFT_SECS: u64 = 300;
/// Maximum transactions per block.
pub const MAX_TXS_PER_BLOCK: usize = 1_350;
/// Maximum serialized block size, in bytes.
pub const MAX_BLOCK_SIZE_BYTES: usize = 900_000;

/// Tunable subset of the above, loaded from node configuration. Defaults
/// reproduce the mainnet constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusConfig {
    /// Seconds between blocks.
    pub block_time_secs: u64,
    /// Blocks per epoch.
    pub epoch_length: u64,
    /// Blocks in a committee's attestation window.
    pub attestation_window: u64,
    /// Maximum committee size.
    pub committee_size: usize,
    /// Blocks between finality checkpoints.
    pub finality_checkpoint_interval: u64,
    /// Maximum reorg depth absent a network-recovery advantage.
    pub max_reorg_depth: u64,
    /// Competing-chain length advantage required to cross a checkpoint.
    pub network_recovery_threshold: u64,
    /// Reorg depth at which the economic gate engages.
    pub reorg_attack_threshold: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            block_time_secs: BLOCK_TIME_SECS,
            epoch_length: EPOCH_LENGTH,
            attestation_window: ATTESTATION_WINDOW,
            committee_size: COMMITTEE_SIZE,
            finality_checkpoint_interval: FINALITY_CHECKPOINT_INTERVAL,
            max_reorg_depth: MAX_REORG_DEPTH,
            network_recovery_threshold: NETWORK_RECOVERY_THRESHOLD,
            reorg_attack_threshold: REORG_ATTACK_THRESHOLD,
        }
    }
}
