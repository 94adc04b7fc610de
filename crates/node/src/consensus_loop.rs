// Path: crates/node/src/consensus_loop.rs
//! The single-threaded consensus cycle (§4.11) and its four safety
//! stops.
//!
//! Everything here runs on one task, which is the sole writer of the
//! ledger and mempool for the lifetime of the process (§5). Transport
//! (gossip, sync responses) lives on other tasks and only ever reaches
//! this one through [`Broadcaster`] (outbound) or the shared
//! [`Mempool`]/read-locked [`Ledger`] (inbound), never by calling back
//! into this loop's own state directly.

use crate::sync::{SyncMachine, SyncPhase, SyncThresholds};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timpal_block::Block;
use timpal_crypto::sign::KeyPair;
use timpal_ledger::Ledger;
use timpal_mempool::Mempool;
use timpal_tx::Transaction;
use timpal_types::Address;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Sends a content payload to the rest of the network. Transport-free
/// by design (§6): a concrete gossip layer implements this.
#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_block(&self, block: &Block);
    async fn broadcast_transaction(&self, tx: &Transaction);
}

/// A [`Broadcaster`] that does nothing, for a single-node bootstrap or
/// test harness.
pub struct NoopBroadcaster;

#[async_trait::async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn broadcast_block(&self, _block: &Block) {}
    async fn broadcast_transaction(&self, _tx: &Transaction) {}
}

/// A snapshot of what the loop currently believes about the rest of
/// the network, refreshed by the transport layer each tick.
#[derive(Debug, Clone, Copy)]
pub struct PeerView {
    pub reachable_peers: usize,
    pub max_peer_height: u64,
    pub online_validator_count: usize,
}

/// Tunables the loop needs beyond what [`Ledger`] already carries.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub block_time_secs: u64,
    pub max_txs_per_block: usize,
    pub required_peers: usize,
    pub is_bootstrap: bool,
    pub min_validators_for_consensus: usize,
    pub external_block_timeout: Duration,
}

/// Why the loop declined to propose this tick, or stopped entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A block was built, applied, and broadcast.
    Produced { height: u64 },
    /// A competing chain won fork choice and was rolled back onto and
    /// replayed (§4.9 Rollback).
    Reorged { new_height: u64 },
    /// The loop is not yet in its proposing window, is syncing, or it
    /// isn't this node's rank's turn yet.
    Idle(&'static str),
    /// One of the four safety-stop conditions (§4.11) is active. The
    /// loop keeps ticking (conditions can clear) but will not propose.
    SafetyStop(&'static str),
}

/// Drives the six-step cycle. Owns the sole write access to `ledger`
/// and `mempool` for as long as this process runs.
pub struct ConsensusLoop<B: Broadcaster> {
    ledger: Arc<RwLock<Ledger>>,
    mempool: Arc<Mempool>,
    keypair: Option<KeyPair>,
    own_address: Option<Address>,
    config: LoopConfig,
    sync: SyncMachine,
    broadcaster: B,
    last_external_block_at: Instant,
    last_block_self_proposed: bool,
    peer_count: Arc<AtomicU64>,
}

impl<B: Broadcaster> ConsensusLoop<B> {
    pub fn new(
        ledger: Arc<RwLock<Ledger>>,
        mempool: Arc<Mempool>,
        keypair: Option<KeyPair>,
        config: LoopConfig,
        sync_thresholds: SyncThresholds,
        broadcaster: B,
        local_height: u64,
        peer_count: Arc<AtomicU64>,
    ) -> Self {
        let own_address = keypair.as_ref().map(|kp| timpal_crypto::derive_address(&kp.public));
        ConsensusLoop {
            ledger,
            mempool,
            keypair,
            own_address,
            config,
            sync: SyncMachine::new(sync_thresholds, local_height),
            broadcaster,
            last_external_block_at: Instant::now(),
            last_block_self_proposed: false,
            peer_count,
        }
    }

    /// Records that a block at `height` arrived from the network rather
    /// than from this loop. Called by the sync/gossip task when it
    /// applies an externally received block.
    pub fn note_external_block(&mut self) {
        self.last_external_block_at = Instant::now();
        self.last_block_self_proposed = false;
    }

    /// Evaluates a full chain received from a peer against the local one,
    /// rolling back and replaying onto it if it wins fork choice (§4.9
    /// Rollback). Called by the sync/gossip task in place of `add_block`
    /// whenever the received chain conflicts with the local one rather
    /// than extending it directly.
    pub async fn receive_competing_chain(&mut self, competing: Vec<Block>, now: u64) -> StepOutcome {
        let mut ledger = self.ledger.write().await;
        match ledger.attempt_reorg(&competing, now) {
            Ok(timpal_ledger::ReorgOutcome::Reorged { new_height }) => {
                drop(ledger);
                self.note_external_block();
                info!(new_height, "reorged onto competing chain");
                StepOutcome::Reorged { new_height }
            }
            Ok(timpal_ledger::ReorgOutcome::LocalChainKept) => {
                StepOutcome::Idle("competing chain did not win fork choice")
            }
            Err(err) => {
                warn!(?err, "competing chain rejected");
                StepOutcome::Idle("competing chain rejected")
            }
        }
    }

    /// Runs one iteration of the cycle. `now` is the current Unix
    /// timestamp; a real caller sleeps between calls so that iterations
    /// land roughly on `parent.timestamp + block_time_secs` (step i).
    pub async fn tick(&mut self, now: u64, peers: PeerView) -> StepOutcome {
        self.peer_count
            .store(peers.reachable_peers as u64, Ordering::Relaxed);

        // Safety stop (a): not enough reachable peers, unless bootstrapping.
        if !self.config.is_bootstrap && peers.reachable_peers < self.config.required_peers {
            return StepOutcome::SafetyStop("insufficient reachable peers");
        }
        // Safety stop (b): too few online validators network-wide.
        if peers.online_validator_count < self.config.min_validators_for_consensus {
            return StepOutcome::SafetyStop("too few online validators");
        }

        let local_height = self.ledger.read().await.height();

        // Safety stop (c): stalled externally, this node ahead of peers.
        if local_height > peers.max_peer_height
            && self.last_external_block_at.elapsed() >= self.config.external_block_timeout
        {
            return StepOutcome::SafetyStop("no external block received and locally ahead");
        }
        // Safety stop (d): previous block was self-proposed and this node
        // is still ahead; refuse to propose twice in a row unchecked.
        if self.last_block_self_proposed && local_height > peers.max_peer_height {
            return StepOutcome::SafetyStop("previous block self-proposed while locally ahead");
        }

        let phase = self.sync.tick(local_height, peers.max_peer_height);
        if !matches!(phase, SyncPhase::Active) {
            return StepOutcome::Idle(phase_name(phase));
        }
        if local_height < peers.max_peer_height {
            return StepOutcome::Idle("behind peer max height, awaiting sync fetch");
        }

        let Some(keypair) = self.keypair.as_ref() else {
            return StepOutcome::Idle("read-only node, no validator key configured");
        };
        let own_address = self
            .own_address
            .as_ref()
            .expect("own_address set whenever keypair is set");

        let mut ledger = self.ledger.write().await;
        let queue = ledger.proposer_queue(local_height);
        let Some(rank) = queue.iter().position(|a| a == own_address) else {
            return StepOutcome::Idle("not in proposer queue for this height");
        };
        let rank = rank as u64;

        let parent_timestamp = ledger.block_at(local_height.saturating_sub(1)).map(|b| b.timestamp);
        let window_start = parent_timestamp.unwrap_or(now) + rank * self.config.block_time_secs;
        let window_end = window_start + self.config.block_time_secs;
        if now < window_start {
            return StepOutcome::Idle("waiting for own proposing window");
        }
        if now >= window_end {
            return StepOutcome::Idle("own proposing window already passed");
        }

        let transactions = self.mempool.select_transactions(self.config.max_txs_per_block);
        let reward = ledger.remaining_emission().min(timpal_ledger::config::EMISSION_PER_BLOCK_PALS);
        let reward_allocations = ledger.next_reward_allocations(reward);
        let previous_hash = ledger.tip_hash();

        let mut block = Block {
            height: local_height,
            timestamp: now.max(window_start),
            transactions,
            previous_hash,
            proposer: own_address.clone(),
            reward,
            reward_allocations,
            merkle_root: timpal_types::Hash256::zero(),
            proposer_signature: String::new(),
            block_hash: timpal_types::Hash256::zero(),
            slot: local_height,
            rank,
        };
        let merkle_root = match block.calculate_merkle_root() {
            Ok(root) => root,
            Err(err) => {
                warn!(?err, "failed to compute merkle root for candidate block");
                return StepOutcome::Idle("merkle root computation failed");
            }
        };
        block.merkle_root = merkle_root;
        let hash = match block.calculate_hash() {
            Ok(hash) => hash,
            Err(err) => {
                warn!(?err, "failed to hash candidate block");
                return StepOutcome::Idle("block hashing failed");
            }
        };
        block.block_hash = hash;
        let signature = keypair.private.sign(&hash.to_bytes());
        block.proposer_signature = hex::encode(signature.to_bytes());

        let committed: Vec<(Address, bool, Option<timpal_types::Hash256>)> = block
            .transactions
            .iter()
            .map(|tx| (tx.sender.clone(), tx.kind.advances_nonce(), tx.tx_hash().ok()))
            .collect();

        match ledger.add_block(block.clone(), now, true, false) {
            Ok(()) => {
                let new_height = ledger.height();
                drop(ledger);
                self.prune_mempool_for(&committed).await;
                self.last_block_self_proposed = true;
                self.broadcaster.broadcast_block(&block).await;
                info!(height = new_height, rank, "produced block");
                StepOutcome::Produced { height: new_height }
            }
            Err(err) => {
                warn!(?err, "candidate block rejected by add_block");
                StepOutcome::Idle("candidate block rejected")
            }
        }
    }

    async fn prune_mempool_for(&self, committed: &[(Address, bool, Option<timpal_types::Hash256>)]) {
        let ledger = self.ledger.read().await;
        let mut seen = BTreeMap::new();
        for (sender, advances_nonce, hash) in committed {
            if *advances_nonce {
                seen.entry(sender.clone()).or_insert(());
            } else if let Some(hash) = hash {
                self.mempool.remove_by_hash(hash);
            }
        }
        for sender in seen.keys() {
            self.mempool.advance_account(sender, ledger.nonce_of(sender));
        }
    }
}

fn phase_name(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Syncing => "syncing",
        SyncPhase::Cooling { .. } => "cooling",
        SyncPhase::Active => "active",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use timpal_economics::config::VALIDATOR_DEPOSIT_PALS;
    use timpal_economics::validator::{ValidatorEntry, ValidatorStatus};
    use timpal_historical::HistoricalStateLog;
    use timpal_ledger::config::LedgerConfig;
    use timpal_storage::Store;

    fn test_validator(keypair: &KeyPair) -> ValidatorEntry {
        ValidatorEntry {
            address: timpal_crypto::derive_address(&keypair.public),
            public_key: hex::encode(keypair.public.to_bytes()),
            device_id: "node-under-test".to_string(),
            status: ValidatorStatus::Genesis,
            registered_at: 0,
            registration_height: 0,
            activation_height: 0,
            deposit_amount: VALIDATOR_DEPOSIT_PALS,
            voting_power: 1,
            proposer_priority: 0,
            auto_lock_enabled: true,
            withdrawal_request_height: None,
        }
    }

    async fn build_ledger(dir: &std::path::Path, keypair: &KeyPair) -> Ledger {
        let store = Store::open(dir).expect("open store");
        let historical = HistoricalStateLog::open(store);
        Ledger::new(LedgerConfig::default(), vec![test_validator(keypair)], historical)
    }

    #[tokio::test]
    async fn insufficient_peers_halts_a_non_bootstrap_node() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::generate();
        let ledger = build_ledger(dir.path(), &keypair).await;
        let config = LoopConfig {
            block_time_secs: 3,
            max_txs_per_block: 1_350,
            required_peers: 3,
            is_bootstrap: false,
            min_validators_for_consensus: 2,
            external_block_timeout: Duration::from_secs(30),
        };
        let thresholds = SyncThresholds {
            lag_threshold: 5,
            severe_lag_threshold: 10,
            cooling_blocks: 1,
            stall_timeout: Duration::from_secs(3600),
        };
        let mut loop_ = ConsensusLoop::new(
            Arc::new(RwLock::new(ledger)),
            Arc::new(Mempool::new()),
            Some(keypair),
            config,
            thresholds,
            NoopBroadcaster,
            0,
            Arc::new(AtomicU64::new(0)),
        );
        let outcome = loop_
            .tick(
                1_700_000_000,
                PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 2 },
            )
            .await;
        assert_eq!(outcome, StepOutcome::SafetyStop("insufficient reachable peers"));
    }

    #[tokio::test]
    async fn bootstrap_node_proposes_genesis_alone() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::generate();
        let ledger = build_ledger(dir.path(), &keypair).await;
        let config = LoopConfig {
            block_time_secs: 3,
            max_txs_per_block: 1_350,
            required_peers: 3,
            is_bootstrap: true,
            min_validators_for_consensus: 1,
            external_block_timeout: Duration::from_secs(30),
        };
        let thresholds = SyncThresholds {
            lag_threshold: 5,
            severe_lag_threshold: 10,
            cooling_blocks: 0,
            stall_timeout: Duration::from_secs(0),
        };
        let mut loop_ = ConsensusLoop::new(
            Arc::new(RwLock::new(ledger)),
            Arc::new(Mempool::new()),
            Some(keypair),
            config,
            thresholds,
            NoopBroadcaster,
            0,
            Arc::new(AtomicU64::new(0)),
        );
        // First tick promotes Syncing -> Cooling -> (stalled) Active, but
        // does not yet propose since the phase only updates once per call.
        let _ = loop_
            .tick(1_700_000_000, PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 1 })
            .await;
        let outcome = loop_
            .tick(1_700_000_000, PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 1 })
            .await;
        assert_eq!(outcome, StepOutcome::Produced { height: 1 });
    }

    fn signed_block(keypair: &KeyPair, height: u64, timestamp: u64, previous_hash: timpal_types::Hash256, reward: u128) -> Block {
        let proposer = timpal_crypto::derive_address(&keypair.public);
        let mut reward_allocations = BTreeMap::new();
        reward_allocations.insert(proposer.clone(), reward);
        let mut block = Block {
            height,
            timestamp,
            transactions: Vec::new(),
            previous_hash,
            proposer,
            reward,
            reward_allocations,
            merkle_root: timpal_types::Hash256::zero(),
            proposer_signature: String::new(),
            block_hash: timpal_types::Hash256::zero(),
            slot: height,
            rank: 0,
        };
        block.merkle_root = block.calculate_merkle_root().unwrap();
        block.block_hash = block.calculate_hash().unwrap();
        let signature = keypair.private.sign(&block.block_hash.to_bytes());
        block.proposer_signature = hex::encode(signature.to_bytes());
        block
    }

    #[tokio::test]
    async fn receive_competing_chain_reorgs_onto_longer_chain() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::generate();
        let signing_keypair = KeyPair { public: keypair.public.clone(), private: keypair.private.clone() };
        let ledger = Arc::new(RwLock::new(build_ledger(dir.path(), &keypair).await));
        let config = LoopConfig {
            block_time_secs: 3,
            max_txs_per_block: 1_350,
            required_peers: 0,
            is_bootstrap: true,
            min_validators_for_consensus: 1,
            external_block_timeout: Duration::from_secs(30),
        };
        let thresholds = SyncThresholds {
            lag_threshold: 5,
            severe_lag_threshold: 10,
            cooling_blocks: 0,
            stall_timeout: Duration::from_secs(0),
        };
        let mut loop_ = ConsensusLoop::new(
            ledger.clone(),
            Arc::new(Mempool::new()),
            Some(keypair),
            config,
            thresholds,
            NoopBroadcaster,
            0,
            Arc::new(AtomicU64::new(0)),
        );
        let _ = loop_
            .tick(1_700_000_000, PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 1 })
            .await;
        let _ = loop_
            .tick(1_700_000_000, PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 1 })
            .await;
        assert_eq!(ledger.read().await.height(), 1);

        let genesis = ledger.read().await.block_at(0).cloned().unwrap();
        let rival_b1 = signed_block(&signing_keypair, 1, genesis.timestamp + 10, genesis.block_hash.clone(), 500);
        let rival_b2 = signed_block(&signing_keypair, 2, rival_b1.timestamp + 10, rival_b1.block_hash.clone(), 500);
        let competing = vec![genesis, rival_b1, rival_b2.clone()];

        let outcome = loop_.receive_competing_chain(competing, 1_700_100_000).await;

        assert_eq!(outcome, StepOutcome::Reorged { new_height: 2 });
        assert_eq!(ledger.read().await.tip_hash(), rival_b2.block_hash);
    }
}
