// Path: crates/node/src/p2p.rs
//! Wire content for the node's peer protocol (§6).
//!
//! These are message *payloads* only — the transport that frames,
//! signs, or multiplexes them is out of scope here. A concrete gossip
//! layer (libp2p, a raw TCP framing, whatever a given deployment picks)
//! serializes one of these as the body of its own envelope.

use serde::{Deserialize, Serialize};
use timpal_block::Block;
use timpal_tx::Transaction;
use timpal_types::Address;

/// Sent once by a freshly joined node to announce itself to the peers
/// it dials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceNode {
    pub device_id: String,
    pub reward_address: Address,
}

/// Gossiped whenever a transaction is accepted into the local mempool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction: Transaction,
}

/// Gossiped whenever a block is applied to the local chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlock {
    pub block: Block,
}

/// Requests blocks from `current_height + 1` onward. `current_height ==
/// -1` asks the peer to send the whole chain starting at height 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncRequest {
    pub current_height: i64,
}

impl SyncRequest {
    /// The height this request should start serving blocks from.
    pub fn start_height(&self) -> u64 {
        if self.current_height < 0 {
            0
        } else {
            (self.current_height as u64) + 1
        }
    }
}

/// Answers a [`SyncRequest`] with the blocks it asked for, in height
/// order starting at `start_height()`. May be a forward extension of the
/// requester's chain, or a competing chain sharing an earlier prefix —
/// the receiving node's ledger decides which via `attempt_reorg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub blocks: Vec<Block>,
}

/// A peer's known peer addresses, exchanged for discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<String>,
}

/// The union of message contents a node may receive from a peer. A
/// transport layer wraps one of these per envelope; nothing here
/// dictates how envelopes are framed or addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    AnnounceNode(AnnounceNode),
    NewTransaction(NewTransaction),
    NewBlock(NewBlock),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
    PeerList(PeerList),
}
