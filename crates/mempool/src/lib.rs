// Path: crates/mempool/src/lib.rs
//! # TIMPAL Mempool
//!
//! A sharded pending-transaction pool (§4.10). Transactions whose kind
//! advances a sender's nonce (transfers, registrations) are queued per
//! account in strict nonce order; everything else (heartbeats,
//! attestations, timeout certificates) goes into a shared FIFO queue
//! since they carry no nonce ordering requirement.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use timpal_tx::{Transaction, TxHash};
use timpal_types::Address;

const SHARD_COUNT: usize = 64;

/// The outcome of attempting to add a transaction to the pool.
#[derive(Debug, PartialEq, Eq)]
pub enum AddResult {
    /// Queued where it is immediately eligible for block inclusion.
    Ready,
    /// Queued behind a nonce gap; not yet eligible.
    Future,
    /// Not admitted: a stale nonce, or already present.
    Rejected(String),
}

#[derive(Debug, Default)]
struct AccountQueue {
    pending_nonce: u64,
    ready: BTreeMap<u64, (Transaction, TxHash)>,
    future: BTreeMap<u64, (Transaction, TxHash)>,
}

impl AccountQueue {
    fn new(committed_nonce: u64) -> Self {
        AccountQueue {
            pending_nonce: committed_nonce,
            ready: BTreeMap::new(),
            future: BTreeMap::new(),
        }
    }

    fn update_base_nonce(&mut self, committed_nonce: u64) -> usize {
        if committed_nonce > self.pending_nonce {
            self.prune_committed(committed_nonce)
        } else {
            0
        }
    }

    fn prune_committed(&mut self, new_committed_nonce: u64) -> usize {
        let mut removed = 0;
        self.pending_nonce = self.pending_nonce.max(new_committed_nonce);

        let stale_ready: Vec<u64> = self.ready.range(..self.pending_nonce).map(|(&n, _)| n).collect();
        for n in stale_ready {
            self.ready.remove(&n);
            removed += 1;
        }
        let stale_future: Vec<u64> = self.future.range(..self.pending_nonce).map(|(&n, _)| n).collect();
        for n in stale_future {
            self.future.remove(&n);
            removed += 1;
        }

        self.try_promote();
        removed
    }

    fn try_promote(&mut self) {
        loop {
            let next_needed = self.pending_nonce + self.ready.len() as u64;
            if let Some(entry) = self.future.remove(&next_needed) {
                self.ready.insert(next_needed, entry);
            } else {
                break;
            }
        }
    }

    fn add(&mut self, tx: Transaction, hash: TxHash, nonce: u64) -> AddResult {
        if nonce < self.pending_nonce {
            return AddResult::Rejected(format!("nonce {nonce} below committed {}", self.pending_nonce));
        }
        if self.ready.contains_key(&nonce) || self.future.contains_key(&nonce) {
            return AddResult::Rejected(format!("nonce {nonce} already queued"));
        }

        let next_needed = self.pending_nonce + self.ready.len() as u64;
        if nonce == next_needed {
            self.ready.insert(nonce, (tx, hash));
            self.try_promote();
            AddResult::Ready
        } else {
            self.future.insert(nonce, (tx, hash));
            AddResult::Future
        }
    }

    fn highest_queued_nonce(&self) -> Option<u64> {
        self.ready.keys().chain(self.future.keys()).max().copied()
    }

    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.future.is_empty()
    }
}

/// A sharded mempool. Account queues are distributed across
/// [`SHARD_COUNT`] locks so concurrent submission from many senders
/// doesn't serialize on a single mutex.
pub struct Mempool {
    shards: Vec<Mutex<HashMap<Address, AccountQueue>>>,
    hasher: RandomState,
    others: Mutex<VecDeque<(Transaction, TxHash)>>,
    total_count: AtomicUsize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    /// Builds an empty mempool.
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(HashMap::new()));
        }
        Mempool {
            shards,
            hasher: RandomState::new(),
            others: Mutex::new(VecDeque::new()),
            total_count: AtomicUsize::new(0),
        }
    }

    fn shard_index(&self, account: &Address) -> usize {
        let mut h = self.hasher.build_hasher();
        account.hash(&mut h);
        (h.finish() as usize) % SHARD_COUNT
    }

    /// Total transactions currently queued, across every account and
    /// the shared non-nonced queue.
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Whether the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `pending_nonce(sender)` (§4.10): the next nonce a fresh
    /// transaction from `sender` should carry, given `ledger_nonce`
    /// (the sender's committed next-nonce) and whatever this sender
    /// already has queued.
    pub fn pending_nonce(&self, sender: &Address, ledger_nonce: u64) -> u64 {
        let idx = self.shard_index(sender);
        let guard = self.shards[idx].lock();
        match guard.get(sender).and_then(AccountQueue::highest_queued_nonce) {
            Some(highest) => ledger_nonce.max(highest + 1),
            None => ledger_nonce,
        }
    }

    /// Adds `tx` (already hashed as `hash`) to the pool. Nonce-advancing
    /// transactions are routed to the sender's account queue under
    /// `committed_nonce` (the sender's current ledger nonce); everything
    /// else joins the shared FIFO queue.
    pub fn add(&self, tx: Transaction, hash: TxHash, committed_nonce: u64) -> AddResult {
        if tx.kind.advances_nonce() {
            let sender = tx.sender.clone();
            let nonce = tx.nonce;
            let idx = self.shard_index(&sender);
            let mut guard = self.shards[idx].lock();
            let queue = guard.entry(sender).or_insert_with(|| AccountQueue::new(committed_nonce));
            let removed = queue.update_base_nonce(committed_nonce);
            self.total_count.fetch_sub(removed, Ordering::Relaxed);

            let result = queue.add(tx, hash, nonce);
            if matches!(result, AddResult::Ready | AddResult::Future) {
                self.total_count.fetch_add(1, Ordering::Relaxed);
            }
            result
        } else {
            self.others.lock().push_back((tx, hash));
            self.total_count.fetch_add(1, Ordering::Relaxed);
            AddResult::Ready
        }
    }

    /// Prunes `account`'s queue after its ledger nonce advances to
    /// `new_committed_nonce`, promoting any future transactions that
    /// become ready.
    pub fn advance_account(&self, account: &Address, new_committed_nonce: u64) {
        let idx = self.shard_index(account);
        let mut guard = self.shards[idx].lock();
        if let Some(queue) = guard.get_mut(account) {
            let removed = queue.prune_committed(new_committed_nonce);
            self.total_count.fetch_sub(removed, Ordering::Relaxed);
            if queue.is_empty() {
                guard.remove(account);
            }
        }
    }

    /// Removes a transaction by hash from wherever it is queued.
    pub fn remove_by_hash(&self, hash: &TxHash) {
        {
            let mut others = self.others.lock();
            if let Some(pos) = others.iter().position(|(_, h)| h == hash) {
                others.remove(pos);
                self.total_count.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        }
        for shard in &self.shards {
            let mut guard = shard.lock();
            for queue in guard.values_mut() {
                if let Some(n) = queue.ready.iter().find(|(_, (_, h))| h == hash).map(|(&n, _)| n) {
                    queue.ready.remove(&n);
                    self.total_count.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
                if let Some(n) = queue.future.iter().find(|(_, (_, h))| h == hash).map(|(&n, _)| n) {
                    queue.future.remove(&n);
                    self.total_count.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    }

    /// Selects up to `limit` ready transactions for block inclusion:
    /// non-nonced transactions first, then each account's ready queue
    /// in nonce order.
    pub fn select_transactions(&self, limit: usize) -> Vec<Transaction> {
        let mut selected = Vec::with_capacity(limit.min(1024));

        {
            let guard = self.others.lock();
            for (tx, _) in guard.iter().take(limit) {
                selected.push(tx.clone());
            }
        }
        if selected.len() >= limit {
            selected.truncate(limit);
            return selected;
        }

        'outer: for shard in &self.shards {
            let guard = shard.lock();
            for queue in guard.values() {
                for (tx, _) in queue.ready.values() {
                    if selected.len() >= limit {
                        break 'outer;
                    }
                    selected.push(tx.clone());
                }
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timpal_crypto::{derive_address, sign::KeyPair};
    use timpal_tx::TransactionKind;

    fn transfer(sender: &KeyPair, nonce: u64) -> (Transaction, TxHash) {
        let recipient = derive_address(&KeyPair::generate().public);
        let mut tx = Transaction {
            sender: derive_address(&sender.public),
            recipient: Some(recipient),
            amount: 1,
            fee: 0,
            timestamp: 0,
            nonce,
            public_key: String::new(),
            signature: None,
            kind: TransactionKind::Transfer,
        };
        tx.sign(&sender.private).unwrap();
        let hash = tx.tx_hash().unwrap();
        (tx, hash)
    }

    #[test]
    fn nonce_gap_queues_to_future_then_promotes() {
        let pool = Mempool::new();
        let sender = KeyPair::generate();
        let (tx1, h1) = transfer(&sender, 1);
        let (tx0, h0) = transfer(&sender, 0);
        assert_eq!(pool.add(tx1, h1, 0), AddResult::Future);
        assert_eq!(pool.add(tx0, h0, 0), AddResult::Ready);
        assert_eq!(pool.select_transactions(10).len(), 2);
    }

    #[test]
    fn stale_nonce_is_rejected() {
        let pool = Mempool::new();
        let sender = KeyPair::generate();
        let (tx, hash) = transfer(&sender, 0);
        assert_eq!(pool.add(tx, hash, 5), AddResult::Rejected("nonce 0 below committed 5".into()));
    }

    #[test]
    fn pending_nonce_reflects_queued_transactions() {
        let pool = Mempool::new();
        let sender = KeyPair::generate();
        let address = derive_address(&sender.public);
        assert_eq!(pool.pending_nonce(&address, 3), 3);
        let (tx, hash) = transfer(&sender, 3);
        pool.add(tx, hash, 3);
        assert_eq!(pool.pending_nonce(&address, 3), 4);
    }

    #[test]
    fn advancing_account_prunes_committed_nonces() {
        let pool = Mempool::new();
        let sender = KeyPair::generate();
        let address = derive_address(&sender.public);
        let (tx, hash) = transfer(&sender, 0);
        pool.add(tx, hash, 0);
        assert_eq!(pool.len(), 1);
        pool.advance_account(&address, 1);
        assert_eq!(pool.len(), 0);
    }
}
