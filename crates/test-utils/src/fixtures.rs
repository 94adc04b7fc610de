// Path: crates/test-utils/src/fixtures.rs
//! Builders for genesis validators, genesis blocks, and signed
//! transactions, so tests across the workspace share one source of
//! truth for "what does a minimally valid X look like".

use std::collections::BTreeMap;
use timpal_block::Block;
use timpal_crypto::sign::KeyPair;
use timpal_crypto::{derive_address, sign::PrivateKey};
use timpal_economics::config::VALIDATOR_DEPOSIT_PALS;
use timpal_economics::validator::{ValidatorEntry, ValidatorStatus};
use timpal_tx::{Transaction, TransactionKind};
use timpal_types::{Address, Hash256};

/// Builds a [`ValidatorEntry`] active from genesis for `keypair`, with
/// `voting_power` and the standard mainnet deposit.
pub fn genesis_validator(keypair: &KeyPair, voting_power: u64) -> ValidatorEntry {
    ValidatorEntry {
        address: derive_address(&keypair.public),
        public_key: hex::encode(keypair.public.to_bytes()),
        device_id: format!("genesis-device-{voting_power}"),
        status: ValidatorStatus::Genesis,
        registered_at: 0,
        registration_height: 0,
        activation_height: 0,
        deposit_amount: VALIDATOR_DEPOSIT_PALS,
        voting_power,
        proposer_priority: 0,
        auto_lock_enabled: true,
        withdrawal_request_height: None,
    }
}

/// Generates `n` fresh keypairs and their corresponding genesis
/// [`ValidatorEntry`] records, each with voting power 1.
pub fn validator_set(n: usize) -> Vec<(KeyPair, ValidatorEntry)> {
    (0..n)
        .map(|_| {
            let keypair = KeyPair::generate();
            let entry = genesis_validator(&keypair, 1);
            (keypair, entry)
        })
        .collect()
}

/// Builds and signs a genesis block (height 0, empty parent hash) with
/// `reward_allocations` credited to the supplied recipients.
pub fn genesis_block(
    proposer: &KeyPair,
    timestamp: u64,
    reward: u128,
    reward_allocations: BTreeMap<Address, u128>,
) -> Block {
    let mut block = Block {
        height: 0,
        timestamp,
        transactions: Vec::new(),
        previous_hash: Hash256::zero(),
        proposer: derive_address(&proposer.public),
        reward,
        reward_allocations,
        merkle_root: Hash256::zero(),
        proposer_signature: String::new(),
        block_hash: Hash256::zero(),
        slot: 0,
        rank: 0,
    };
    sign_block(&mut block, &proposer.private);
    block
}

/// Recomputes `merkle_root`/`block_hash` and signs `block` with
/// `private_key`, mutating it in place. Exposed so callers building
/// non-genesis blocks can reuse the same finishing step.
pub fn sign_block(block: &mut Block, private_key: &PrivateKey) {
    let merkle_root = block
        .calculate_merkle_root()
        .unwrap_or_else(|_| Hash256::zero());
    block.merkle_root = merkle_root;
    let hash = block.calculate_hash().unwrap_or_else(|_| Hash256::zero());
    block.block_hash = hash;
    let signature = private_key.sign(&hash.to_bytes());
    block.proposer_signature = hex::encode(signature.to_bytes());
}

/// Builds and signs a plain transfer from `sender` to `recipient`.
pub fn signed_transfer(
    sender: &KeyPair,
    recipient: Address,
    amount: u128,
    fee: u128,
    nonce: u64,
    timestamp: u64,
) -> Transaction {
    let mut tx = Transaction {
        sender: derive_address(&sender.public),
        recipient: Some(recipient),
        amount,
        fee,
        timestamp,
        nonce,
        public_key: String::new(),
        signature: None,
        kind: TransactionKind::Transfer,
    };
    let _ = tx.sign(&sender.private);
    tx
}
