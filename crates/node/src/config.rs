// Path: crates/node/src/config.rs
//! CLI surface and the on-disk node configuration (§6, ambient stack).
//!
//! Mirrors the teacher's `OrchestrationOpts`/`*.toml` split: a small
//! `clap::Parser` struct for flags that vary per process invocation
//! (data directory, listen address, identity key), and a `serde`-loaded
//! TOML struct for everything that should be checked into a config file
//! and shared across restarts.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use timpal_consensus::ConsensusConfig;
use timpal_economics::EconomicsConfig;
use timpal_ledger::LedgerConfig;

/// Command-line flags for the `timpal-node` binary.
#[derive(Parser, Debug)]
#[command(name = "timpal-node", about = "TIMPAL validator node")]
pub struct Cli {
    /// Path to the node's `node.toml` configuration file.
    #[arg(long, env = "TIMPAL_CONFIG")]
    pub config: PathBuf,
    /// Directory holding the redb-backed historical state log.
    #[arg(long, env = "TIMPAL_DATA_DIR")]
    pub data_dir: PathBuf,
    /// Hex-encoded 32-byte secp256k1 private key scalar this node
    /// proposes and attests with. A bootstrap/read-only node omits this.
    #[arg(long, env = "TIMPAL_VALIDATOR_KEY")]
    pub validator_key: Option<String>,
    /// Address the ambient HTTP API (`/api/*`, `/healthz`, `/metrics`)
    /// listens on.
    #[arg(long, env = "TIMPAL_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub http_addr: SocketAddr,
}

/// The TOML-loaded, checked-in configuration: consensus/economics
/// tunables plus the handful of per-network parameters that aren't
/// mainnet constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Number of peers this node expects to reach before it will
    /// propose, unless it is the network's bootstrap node (§4.11 safety
    /// stop (a)).
    #[serde(default = "default_required_peers")]
    pub required_peers: usize,
    /// Whether this node is the network's bootstrap node, exempting it
    /// from the required-peers safety stop.
    #[serde(default)]
    pub is_bootstrap: bool,
    /// Seconds without an externally received block before the safety
    /// stop (c) engages, if this node is ahead of its peers.
    #[serde(default = "default_external_block_timeout_secs")]
    pub external_block_timeout_secs: u64,
    /// Maximum height lag behind the best known peer before the sync
    /// phase machine drops from ACTIVE to SYNCING.
    #[serde(default = "default_sync_lag_threshold")]
    pub sync_lag_threshold: u64,
    /// Height lag considered severe: triggers an immediate drop to
    /// SYNCING even from ACTIVE.
    #[serde(default = "default_severe_lag_threshold")]
    pub severe_lag_threshold: u64,
    /// Consecutive blocks to hold in COOLING before promoting to ACTIVE.
    #[serde(default = "default_sync_cooling_blocks")]
    pub sync_cooling_blocks: u64,
    /// If set, the genesis block must hash to exactly this value.
    #[serde(default)]
    pub canonical_genesis_hash: Option<String>,
    /// Consensus tunables (committee size, epoch length, reorg bounds).
    #[serde(default)]
    pub consensus: ConsensusConfigToml,
    /// Economics tunables (deposit floor, grace period, withdrawal delay).
    #[serde(default)]
    pub economics: EconomicsConfigToml,
}

fn default_required_peers() -> usize {
    3
}
fn default_external_block_timeout_secs() -> u64 {
    30
}
fn default_sync_lag_threshold() -> u64 {
    5
}
fn default_severe_lag_threshold() -> u64 {
    10
}
fn default_sync_cooling_blocks() -> u64 {
    5
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            required_peers: default_required_peers(),
            is_bootstrap: false,
            external_block_timeout_secs: default_external_block_timeout_secs(),
            sync_lag_threshold: default_sync_lag_threshold(),
            severe_lag_threshold: default_severe_lag_threshold(),
            sync_cooling_blocks: default_sync_cooling_blocks(),
            canonical_genesis_hash: None,
            consensus: ConsensusConfigToml::default(),
            economics: EconomicsConfigToml::default(),
        }
    }
}

impl NodeConfig {
    /// Loads and parses a `node.toml` file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Builds the [`LedgerConfig`] this node's ledger should start with.
    pub fn ledger_config(&self) -> anyhow::Result<LedgerConfig> {
        let canonical_genesis_hash = self
            .canonical_genesis_hash
            .as_deref()
            .map(timpal_types::Hash256::parse)
            .transpose()?;
        Ok(LedgerConfig {
            consensus: self.consensus.clone().into(),
            economics: self.economics.clone().into(),
            canonical_genesis_hash,
            ..LedgerConfig::default()
        })
    }
}

/// A TOML-serializable mirror of [`ConsensusConfig`] (which has no
/// `Serialize`/`Deserialize` of its own, being a mainnet-constants bag
/// shared by non-serialized internal state too).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfigToml {
    pub block_time_secs: u64,
    pub epoch_length: u64,
    pub attestation_window: u64,
    pub committee_size: usize,
    pub finality_checkpoint_interval: u64,
    pub max_reorg_depth: u64,
    pub network_recovery_threshold: u64,
    pub reorg_attack_threshold: u64,
}

impl Default for ConsensusConfigToml {
    fn default() -> Self {
        ConsensusConfig::default().into()
    }
}

impl From<ConsensusConfig> for ConsensusConfigToml {
    fn from(c: ConsensusConfig) -> Self {
        ConsensusConfigToml {
            block_time_secs: c.block_time_secs,
            epoch_length: c.epoch_length,
            attestation_window: c.attestation_window,
            committee_size: c.committee_size,
            finality_checkpoint_interval: c.finality_checkpoint_interval,
            max_reorg_depth: c.max_reorg_depth,
            network_recovery_threshold: c.network_recovery_threshold,
            reorg_attack_threshold: c.reorg_attack_threshold,
        }
    }
}

impl From<ConsensusConfigToml> for ConsensusConfig {
    fn from(c: ConsensusConfigToml) -> Self {
        ConsensusConfig {
            block_time_secs: c.block_time_secs,
            epoch_length: c.epoch_length,
            attestation_window: c.attestation_window,
            committee_size: c.committee_size,
            finality_checkpoint_interval: c.finality_checkpoint_interval,
            max_reorg_depth: c.max_reorg_depth,
            network_recovery_threshold: c.network_recovery_threshold,
            reorg_attack_threshold: c.reorg_attack_threshold,
        }
    }
}

/// A TOML-serializable mirror of [`EconomicsConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsConfigToml {
    pub validator_deposit_pals: u128,
    pub min_deposit_pals: u128,
    pub grace_period_blocks: u64,
    pub withdrawal_delay_blocks: u64,
}

impl Default for EconomicsConfigToml {
    fn default() -> Self {
        EconomicsConfig::default().into()
    }
}

impl From<EconomicsConfig> for EconomicsConfigToml {
    fn from(c: EconomicsConfig) -> Self {
        EconomicsConfigToml {
            validator_deposit_pals: c.validator_deposit_pals,
            min_deposit_pals: c.min_deposit_pals,
            grace_period_blocks: c.grace_period_blocks,
            withdrawal_delay_blocks: c.withdrawal_delay_blocks,
        }
    }
}

impl From<EconomicsConfigToml> for EconomicsConfig {
    fn from(c: EconomicsConfigToml) -> Self {
        EconomicsConfig {
            validator_deposit_pals: c.validator_deposit_pals,
            min_deposit_pals: c.min_deposit_pals,
            grace_period_blocks: c.grace_period_blocks,
            withdrawal_delay_blocks: c.withdrawal_delay_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.required_peers, config.required_peers);
        assert_eq!(parsed.consensus.committee_size, config.consensus.committee_size);
    }

    #[test]
    fn ledger_config_rejects_malformed_genesis_hash() {
        let mut config = NodeConfig::default();
        config.canonical_genesis_hash = Some("not-a-hash".to_string());
        assert!(config.ledger_config().is_err());
    }
}
