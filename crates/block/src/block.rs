// Path: crates/block/src/block.rs
//! The block type: ordered transactions under a Merkle root, a header
//! hashed over the fields the consensus contract cares about, and a
//! proposer signature over that hash.

use crate::merkle::calculate_merkle_root;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use timpal_crypto::sha256_hash256;
use timpal_crypto::sign::{PublicKey, Signature};
use timpal_tx::Transaction;
use timpal_types::codec::{to_canonical_json, CodecError};
use timpal_types::{Address, Hash256};

/// The subset of block fields that feed `block_hash` (§3: "block_hash =
/// SHA-256 over canonical JSON of {height, timestamp, merkle_root,
/// previous_hash, proposer, reward, reward_allocations, slot, rank}").
#[derive(Serialize)]
struct HeaderPayload<'a> {
    height: u64,
    timestamp: u64,
    merkle_root: &'a Hash256,
    previous_hash: &'a Hash256,
    proposer: &'a Address,
    reward: u128,
    reward_allocations: &'a BTreeMap<Address, u128>,
    slot: u64,
    rank: u8,
}

/// A TIMPAL block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block's height; equals its index in the canonical chain.
    pub height: u64,
    /// Unix timestamp, in seconds.
    pub timestamp: u64,
    /// Transactions in application order.
    pub transactions: Vec<Transaction>,
    /// The hash of the parent block; all-zero for genesis.
    pub previous_hash: Hash256,
    /// The address that produced and signed this block.
    pub proposer: Address,
    /// Newly minted reward for this block, in pals.
    pub reward: u128,
    /// Reward credits for this block, keyed by recipient address. A
    /// `BTreeMap` so the wire and hashed form is sorted by address.
    pub reward_allocations: BTreeMap<Address, u128>,
    /// The Merkle root over `transactions`' fresh hashes, as recorded by
    /// the proposer. Verification MUST NOT trust this field; it is
    /// always recomputed (§4.3).
    pub merkle_root: Hash256,
    /// The proposer's raw 64-byte `r || s` signature over `block_hash`,
    /// hex-encoded.
    pub proposer_signature: String,
    /// The block hash, as recorded by the proposer. Verification MUST
    /// NOT trust this field either; it is always recomputed.
    pub block_hash: Hash256,
    /// The scheduling slot (one per height) this block was produced for.
    pub slot: u64,
    /// The fallback rank within the slot; 0 is the primary proposer.
    pub rank: u8,
}

impl Block {
    /// Recomputes the Merkle root from `transactions`' fresh hashes.
    /// Never trusts `self.merkle_root`.
    pub fn calculate_merkle_root(&self) -> Result<Hash256, CodecError> {
        let mut leaves = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            leaves.push(tx.tx_hash()?);
        }
        Ok(calculate_merkle_root(&leaves))
    }

    /// Recomputes `block_hash`, always recomputing `merkle_root` first so
    /// post-sign tampering with either the transaction set or the header
    /// is detected.
    pub fn calculate_hash(&self) -> Result<Hash256, CodecError> {
        let merkle_root = self.calculate_merkle_root()?;
        let payload = HeaderPayload {
            height: self.height,
            timestamp: self.timestamp,
            merkle_root: &merkle_root,
            previous_hash: &self.previous_hash,
            proposer: &self.proposer,
            reward: self.reward,
            reward_allocations: &self.reward_allocations,
            slot: self.slot,
            rank: self.rank,
        };
        let bytes = to_canonical_json(&payload)?;
        Ok(sha256_hash256(bytes))
    }

    /// Verifies the proposer's signature. Re-hashes the block first, so
    /// the signature is checked against freshly recomputed state, not
    /// the (untrusted) stored `block_hash`.
    pub fn verify_proposer_signature(&self, proposer_public_key: &PublicKey) -> bool {
        self.verify_proposer_signature_inner(proposer_public_key)
            .unwrap_or(false)
    }

    fn verify_proposer_signature_inner(
        &self,
        proposer_public_key: &PublicKey,
    ) -> Result<bool, CodecError> {
        let hash = self.calculate_hash()?;
        let signature_bytes = match hex::decode(&self.proposer_signature) {
            Ok(b) => b,
            Err(_) => return Ok(false),
        };
        let signature = match Signature::from_bytes(&signature_bytes) {
            Ok(s) => s,
            Err(_) => return Ok(false),
        };
        Ok(proposer_public_key.verify(&hash.to_bytes(), &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timpal_crypto::{derive_address, sign::KeyPair};

    fn signed_block(proposer: &KeyPair, height: u64) -> Block {
        let proposer_address = derive_address(&proposer.public);
        let mut reward_allocations = BTreeMap::new();
        reward_allocations.insert(proposer_address.clone(), 1_000u128);

        let mut block = Block {
            height,
            timestamp: 1_700_000_000 + height,
            transactions: Vec::new(),
            previous_hash: Hash256::zero(),
            proposer: proposer_address,
            reward: 1_000,
            reward_allocations,
            merkle_root: Hash256::zero(),
            proposer_signature: String::new(),
            block_hash: Hash256::zero(),
            slot: height,
            rank: 0,
        };
        block.merkle_root = block.calculate_merkle_root().unwrap();
        block.block_hash = block.calculate_hash().unwrap();
        let signature = proposer.private.sign(&block.block_hash.to_bytes());
        block.proposer_signature = hex::encode(signature.to_bytes());
        block
    }

    #[test]
    fn proposer_signature_verifies() {
        let proposer = KeyPair::generate();
        let block = signed_block(&proposer, 1);
        assert!(block.verify_proposer_signature(&proposer.public));
    }

    #[test]
    fn tampering_with_reward_breaks_signature() {
        let proposer = KeyPair::generate();
        let mut block = signed_block(&proposer, 1);
        block.reward += 1;
        assert!(!block.verify_proposer_signature(&proposer.public));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let proposer = KeyPair::generate();
        let other = KeyPair::generate();
        let block = signed_block(&proposer, 1);
        assert!(!block.verify_proposer_signature(&other.public));
    }

    #[test]
    fn empty_block_has_merkle_root_of_empty_string() {
        let proposer = KeyPair::generate();
        let block = signed_block(&proposer, 1);
        assert_eq!(
            block.calculate_merkle_root().unwrap(),
            calculate_merkle_root(&[])
        );
    }
}
