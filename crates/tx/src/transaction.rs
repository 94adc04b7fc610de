// Path: crates/tx/src/transaction.rs
//! The transaction type: a tagged variant over every kind of state change
//! the ledger accepts, plus the common envelope (sender, amount, fee,
//! nonce, signature) shared by all of them.

use crate::vote::TimeoutVote;
use serde::{Deserialize, Serialize};
use timpal_crypto::sign::{PrivateKey, PublicKey, Signature};
use timpal_crypto::{derive_address, sha256_hash256};
use timpal_types::codec::{to_canonical_json, CodecError};
use timpal_types::error::TxError;
use timpal_types::{Address, Hash256};

/// Maximum supply, in pals. Mirrors the mainnet constant (§6): `2.5e8 * 1e8`.
pub const MAX_SUPPLY_PALS: u128 = 250_000_000 * 100_000_000;

/// A SHA-256 transaction hash, rendered as lowercase hex.
pub type TxHash = Hash256;

/// The type-specific payload of a transaction. Tagged by `tx_type` in the
/// wire format (§6), with fields for a given type present only on that
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tx_type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// A plain balance transfer from `sender` to `recipient`.
    Transfer,
    /// Registers `sender` as a validator candidate bound to `device_id`.
    ValidatorRegistration {
        /// Opaque per-device identifier; at most one active registration
        /// may bind to a given `device_id` (Sybil-bypass guard).
        device_id: String,
    },
    /// Legacy liveness ping. Does not advance the sender's nonce.
    ValidatorHeartbeat,
    /// A committee member's attestation of liveness for an epoch.
    EpochAttestation {
        /// The epoch being attested to.
        epoch_number: u64,
    },
    /// An aggregated quorum certificate asserting that a round timed out.
    TimeoutCertificate {
        /// The height the certificate applies to.
        height: u64,
        /// The round being certified as timed out.
        round: u64,
        /// The individual validator votes making up the certificate.
        votes: Vec<TimeoutVote>,
    },
    /// A system-minted reward, used only inside the genesis block.
    GenesisReward,
}

impl TransactionKind {
    /// Whether a transaction of this kind advances the sender's nonce
    /// (§4.2: "transfers and registrations advance `nonces[sender]`").
    pub fn advances_nonce(&self) -> bool {
        matches!(
            self,
            TransactionKind::Transfer | TransactionKind::ValidatorRegistration { .. }
        )
    }
}

/// A TIMPAL transaction: the common envelope plus a type-specific
/// [`TransactionKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The sending address; must equal `derive_address(public_key)`.
    pub sender: Address,
    /// The receiving address, absent for transactions with no transfer
    /// target (registration, heartbeat, attestation, timeout certificate).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recipient: Option<Address>,
    /// Amount moved, in pals. Zero for non-transfer transaction kinds.
    pub amount: u128,
    /// Fee paid by the sender, in pals.
    pub fee: u128,
    /// Unix timestamp, in seconds, at which the transaction was created.
    pub timestamp: u64,
    /// The sender's nonce at the time of signing.
    pub nonce: u64,
    /// The sender's uncompressed SEC1 public key, hex-encoded.
    pub public_key: String,
    /// The raw 64-byte `r || s` signature over `tx_hash`, hex-encoded.
    /// `None` only for a transaction under construction, never once
    /// broadcast or applied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
    /// The type-specific payload.
    #[serde(flatten)]
    pub kind: TransactionKind,
}

/// The subset of a transaction's fields that are hashed. Excludes
/// `signature`, since a signature cannot cover its own bytes.
#[derive(Serialize)]
struct SignablePayload<'a> {
    sender: &'a Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: &'a Option<Address>,
    amount: u128,
    fee: u128,
    timestamp: u64,
    nonce: u64,
    public_key: &'a str,
    #[serde(flatten)]
    kind: &'a TransactionKind,
}

impl Transaction {
    /// Computes `tx_hash`: SHA-256 over the canonical JSON of every
    /// semantic field except the signature itself.
    pub fn tx_hash(&self) -> Result<TxHash, CodecError> {
        let payload = SignablePayload {
            sender: &self.sender,
            recipient: &self.recipient,
            amount: self.amount,
            fee: self.fee,
            timestamp: self.timestamp,
            nonce: self.nonce,
            public_key: &self.public_key,
            kind: &self.kind,
        };
        let bytes = to_canonical_json(&payload)?;
        Ok(sha256_hash256(bytes))
    }

    /// Signs the transaction in place with `private_key`, setting
    /// `public_key` and `signature`.
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), CodecError> {
        self.public_key = hex::encode(private_key.public_key().to_bytes());
        let hash = self.tx_hash()?;
        let signature = private_key.sign(&hash.to_bytes());
        self.signature = Some(hex::encode(signature.to_bytes()));
        Ok(())
    }

    /// `verify() -> bool`: the signature verifies against `public_key`
    /// over `tx_hash`, and `derive_address(public_key) == sender`.
    /// Never throws; any structural problem is simply "not verified".
    pub fn verify(&self) -> bool {
        self.verify_inner().is_ok()
    }

    fn verify_inner(&self) -> Result<(), TxError> {
        let signature_hex = self
            .signature
            .as_deref()
            .ok_or_else(|| TxError::Malformed("missing signature".into()))?;
        let public_key_bytes =
            hex::decode(&self.public_key).map_err(|_| TxError::Malformed("bad public_key".into()))?;
        let signature_bytes =
            hex::decode(signature_hex).map_err(|_| TxError::Malformed("bad signature".into()))?;
        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|_| TxError::Malformed("bad public_key".into()))?;
        let signature = Signature::from_bytes(&signature_bytes)
            .map_err(|_| TxError::Malformed("bad signature".into()))?;

        if derive_address(&public_key) != self.sender {
            return Err(TxError::AddressMismatch);
        }

        let hash = self
            .tx_hash()
            .map_err(|e| TxError::Malformed(e.to_string()))?;
        public_key
            .verify(&hash.to_bytes(), &signature)
            .map_err(|_| TxError::InvalidSignature)
    }

    /// Self-contained per-type validity rules that don't require
    /// consulting the in-block or registry dedup sets (those are the
    /// ledger's responsibility: §4.9 step 7).
    ///
    /// `balance` and `expected_nonce` are the sender's current world-state
    /// values; `min_deposit` is the currently-effective validator deposit
    /// floor (zero during the deposit grace period).
    pub fn is_valid(
        &self,
        balance: u128,
        expected_nonce: u64,
        min_deposit: u128,
    ) -> Result<(), TxError> {
        if self.amount > MAX_SUPPLY_PALS || self.fee > MAX_SUPPLY_PALS {
            return Err(TxError::InvalidAmount(
                "amount or fee exceeds max supply".into(),
            ));
        }
        if self.kind.advances_nonce() && self.nonce != expected_nonce {
            return Err(TxError::NonceMismatch {
                expected: expected_nonce,
                got: self.nonce,
            });
        }
        match &self.kind {
            TransactionKind::Transfer => {
                let total = self.amount.saturating_add(self.fee);
                if total > balance {
                    return Err(TxError::InsufficientBalance {
                        have: balance,
                        need: total,
                    });
                }
                if self.recipient.is_none() {
                    return Err(TxError::Malformed("transfer missing recipient".into()));
                }
                Ok(())
            }
            TransactionKind::ValidatorRegistration { device_id } => {
                if device_id.is_empty() {
                    return Err(TxError::Malformed("empty device_id".into()));
                }
                if balance < min_deposit {
                    return Err(TxError::InsufficientDeposit {
                        have: balance,
                        need: min_deposit,
                    });
                }
                Ok(())
            }
            TransactionKind::ValidatorHeartbeat => Ok(()),
            TransactionKind::EpochAttestation { epoch_number: _ } => Ok(()),
            TransactionKind::TimeoutCertificate { votes, .. } => {
                if votes.is_empty() {
                    return Err(TxError::Invalid("timeout certificate has no votes".into()));
                }
                Ok(())
            }
            TransactionKind::GenesisReward => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timpal_crypto::sign::KeyPair;

    fn make_transfer(sender: &KeyPair, recipient: Address, nonce: u64) -> Transaction {
        let mut tx = Transaction {
            sender: derive_address(&sender.public),
            recipient: Some(recipient),
            amount: 1_000,
            fee: 10,
            timestamp: 1_700_000_000,
            nonce,
            public_key: String::new(),
            signature: None,
            kind: TransactionKind::Transfer,
        };
        tx.sign(&sender.private).unwrap();
        tx
    }

    #[test]
    fn signed_transfer_verifies() {
        let sender = KeyPair::generate();
        let recipient = derive_address(&KeyPair::generate().public);
        let tx = make_transfer(&sender, recipient, 0);
        assert!(tx.verify());
    }

    #[test]
    fn tampering_with_amount_breaks_verification() {
        let sender = KeyPair::generate();
        let recipient = derive_address(&KeyPair::generate().public);
        let mut tx = make_transfer(&sender, recipient, 0);
        tx.amount += 1;
        assert!(!tx.verify());
    }

    #[test]
    fn is_valid_rejects_insufficient_balance() {
        let sender = KeyPair::generate();
        let recipient = derive_address(&KeyPair::generate().public);
        let tx = make_transfer(&sender, recipient, 0);
        let err = tx.is_valid(5, 0, 0).unwrap_err();
        assert_eq!(
            err,
            TxError::InsufficientBalance {
                have: 5,
                need: 1_010
            }
        );
    }

    #[test]
    fn is_valid_rejects_nonce_mismatch() {
        let sender = KeyPair::generate();
        let recipient = derive_address(&KeyPair::generate().public);
        let tx = make_transfer(&sender, recipient, 3);
        let err = tx.is_valid(10_000, 0, 0).unwrap_err();
        assert_eq!(
            err,
            TxError::NonceMismatch {
                expected: 0,
                got: 3
            }
        );
    }

    #[test]
    fn heartbeat_does_not_advance_nonce() {
        assert!(!TransactionKind::ValidatorHeartbeat.advances_nonce());
        assert!(TransactionKind::Transfer.advances_nonce());
    }

    #[test]
    fn tx_hash_is_stable_across_recomputation() {
        let sender = KeyPair::generate();
        let recipient = derive_address(&KeyPair::generate().public);
        let tx = make_transfer(&sender, recipient, 0);
        assert_eq!(tx.tx_hash().unwrap(), tx.tx_hash().unwrap());
    }
}
