// Path: crates/types/src/error.rs
//! The shared error taxonomy for the TIMPAL consensus core.
//!
//! Errors are grouped by the categories of §7: structural, authentication,
//! validation, consensus, integrity, and transient. Structural/auth/
//! validation/consensus errors are rejections with no state mutation;
//! integrity errors are hard failures that must halt the affected
//! operation (never silently falling back); transient errors are for the
//! caller to retry or skip.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an
/// error, so callers (HTTP handlers, peer banning logic) can branch on a
/// code without matching on error internals.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while constructing, hashing, or validating a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The signature does not verify against the claimed public key.
    #[error("invalid signature")]
    InvalidSignature,
    /// `derive_address(public_key) != sender`.
    #[error("sender address does not match public key")]
    AddressMismatch,
    /// The sender's balance is insufficient for `amount + fee`.
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance {
        /// The sender's current balance.
        have: u128,
        /// The amount required (`amount + fee`).
        need: u128,
    },
    /// The transaction's nonce does not equal the sender's expected nonce.
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// The ledger's recorded next-nonce for the sender.
        expected: u64,
        /// The nonce carried by the transaction.
        got: u64,
    },
    /// A monetary field was negative or exceeded `MAX_SUPPLY_PALS`.
    #[error("invalid monetary amount: {0}")]
    InvalidAmount(String),
    /// A `validator_registration` reused a `device_id` already bound to an
    /// active validator, or duplicated one in-block (Sybil-bypass guard).
    #[error("duplicate device_id")]
    DuplicateDeviceId,
    /// A `validator_registration` reused a public key already registered.
    #[error("duplicate public_key")]
    DuplicatePublicKey,
    /// The sender balance does not meet `MIN_DEPOSIT` after the grace period.
    #[error("insufficient validator deposit: have {have}, need {need}")]
    InsufficientDeposit {
        /// The amount offered.
        have: u128,
        /// The minimum required deposit.
        need: u128,
    },
    /// Field shape or type was structurally invalid.
    #[error("malformed transaction: {0}")]
    Malformed(String),
    /// Generic catch-all for a per-type validity rule failure.
    #[error("invalid transaction: {0}")]
    Invalid(String),
}

impl ErrorCode for TxError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "TX_INVALID_SIGNATURE",
            Self::AddressMismatch => "TX_ADDRESS_MISMATCH",
            Self::InsufficientBalance { .. } => "TX_INSUFFICIENT_BALANCE",
            Self::NonceMismatch { .. } => "TX_NONCE_MISMATCH",
            Self::InvalidAmount(_) => "TX_INVALID_AMOUNT",
            Self::DuplicateDeviceId => "TX_DUPLICATE_DEVICE_ID",
            Self::DuplicatePublicKey => "TX_DUPLICATE_PUBLIC_KEY",
            Self::InsufficientDeposit { .. } => "TX_INSUFFICIENT_DEPOSIT",
            Self::Malformed(_) => "TX_MALFORMED",
            Self::Invalid(_) => "TX_INVALID",
        }
    }
}

/// Errors raised while validating or applying a block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// `height != chain.len()`.
    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight {
        /// The expected next height.
        expected: u64,
        /// The height carried by the block.
        got: u64,
    },
    /// `previous_hash` does not match the current tip's hash.
    #[error("mismatched previous hash: expected {expected}, got {got}")]
    MismatchedPrevHash {
        /// The hash of the current tip.
        expected: String,
        /// The `previous_hash` carried by the block.
        got: String,
    },
    /// `timestamp` is not strictly after the parent, or violates `BLOCK_TIME`.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// `timestamp` is further in the future than `MAX_FUTURE_TIMESTAMP_DRIFT` allows.
    #[error("timestamp too far in the future")]
    TimestampTooFarInFuture,
    /// The recomputed Merkle root does not match the stored one.
    #[error("merkle root mismatch")]
    MerkleRootMismatch,
    /// The proposer signature does not verify over the recomputed block hash.
    #[error("invalid proposer signature")]
    InvalidProposerSignature,
    /// Genesis was submitted against a non-empty chain, or its hash does
    /// not match the configured `CANONICAL_GENESIS_HASH`.
    #[error("invalid genesis block: {0}")]
    InvalidGenesis(String),
    /// Serialized block size exceeded `MAX_BLOCK_SIZE`.
    #[error("block too large: {size} bytes (max {max})")]
    TooLarge {
        /// The serialized size observed.
        size: usize,
        /// The configured maximum.
        max: usize,
    },
    /// `transactions.len() > MAX_TXS_PER_BLOCK`.
    #[error("too many transactions: {count} (max {max})")]
    TooManyTransactions {
        /// The number of transactions in the block.
        count: usize,
        /// The configured maximum.
        max: usize,
    },
    /// Minted reward exceeded the remaining emission budget.
    #[error("reward exceeds remaining emission")]
    RewardExceedsEmission,
    /// A transaction embedded in the block failed validation.
    #[error("transaction invalid: {0}")]
    Transaction(#[from] TxError),
}

impl ErrorCode for BlockError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidHeight { .. } => "BLOCK_INVALID_HEIGHT",
            Self::MismatchedPrevHash { .. } => "BLOCK_MISMATCHED_PREV_HASH",
            Self::InvalidTimestamp(_) => "BLOCK_INVALID_TIMESTAMP",
            Self::TimestampTooFarInFuture => "BLOCK_TIMESTAMP_FUTURE",
            Self::MerkleRootMismatch => "BLOCK_MERKLE_MISMATCH",
            Self::InvalidProposerSignature => "BLOCK_INVALID_PROPOSER_SIGNATURE",
            Self::InvalidGenesis(_) => "BLOCK_INVALID_GENESIS",
            Self::TooLarge { .. } => "BLOCK_TOO_LARGE",
            Self::TooManyTransactions { .. } => "BLOCK_TOO_MANY_TXS",
            Self::RewardExceedsEmission => "BLOCK_REWARD_EXCEEDS_EMISSION",
            Self::Transaction(_) => "BLOCK_TX_INVALID",
        }
    }
}

/// Errors raised by the VRF/attestation/fork-choice consensus layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The block's proposer does not match `queue[rank]` for its `(slot, rank)`.
    #[error("wrong proposer for slot {slot} rank {rank}: expected {expected}, got {got}")]
    WrongProposer {
        /// The slot (block height) in question.
        slot: u64,
        /// The fallback rank claimed.
        rank: u8,
        /// The address expected at that rank.
        expected: String,
        /// The address that actually signed the block.
        got: String,
    },
    /// The block's timestamp falls outside the time-sliced window for its `(slot, rank)`.
    #[error("timestamp outside (slot, rank) window")]
    OutOfWindow,
    /// An `epoch_attestation` was submitted for a future epoch.
    #[error("attestation epoch {0} is in the future")]
    AttestationFutureEpoch(u64),
    /// An `epoch_attestation` was submitted for an epoch too old to record.
    #[error("attestation epoch {0} is too old")]
    AttestationTooOld(u64),
    /// The validator is not a member of the epoch's sampled committee.
    #[error("validator is not a committee member for epoch {0}")]
    NotCommitteeMember(u64),
    /// The attesting block height falls outside `[epoch_start(e), deadline(e)]`.
    #[error("attestation height outside epoch window")]
    AttestationOutOfWindow,
    /// The validator already attested for this epoch.
    #[error("duplicate attestation for epoch {0}")]
    DuplicateAttestation(u64),
    /// A `timeout_certificate`'s votes did not reach the required quorum.
    #[error("timeout certificate quorum not reached: {have}/{need}")]
    QuorumNotReached {
        /// The accumulated voting power.
        have: u128,
        /// The required threshold.
        need: u128,
    },
    /// A `timeout_certificate` hash was already used for this round.
    #[error("timeout certificate already used")]
    CertificateAlreadyUsed,
    /// A reorg attempted to cross a finality checkpoint without the
    /// required network-recovery chain-length advantage.
    #[error("reorg would cross finality checkpoint")]
    PastFinalityCheckpoint,
    /// A reorg exceeded `MAX_REORG_DEPTH` without recovery-threshold cover.
    #[error("reorg depth {depth} exceeds maximum")]
    ReorgTooDeep {
        /// The computed reorg depth.
        depth: u64,
    },
    /// The 51%-style economic gate rejected a deep reorg.
    #[error("reorg rejected: attacking branch does not control enough stake")]
    InsufficientAttackStake,
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::WrongProposer { .. } => "CONSENSUS_WRONG_PROPOSER",
            Self::OutOfWindow => "CONSENSUS_OUT_OF_WINDOW",
            Self::AttestationFutureEpoch(_) => "CONSENSUS_ATTESTATION_FUTURE_EPOCH",
            Self::AttestationTooOld(_) => "CONSENSUS_ATTESTATION_TOO_OLD",
            Self::NotCommitteeMember(_) => "CONSENSUS_NOT_COMMITTEE_MEMBER",
            Self::AttestationOutOfWindow => "CONSENSUS_ATTESTATION_OUT_OF_WINDOW",
            Self::DuplicateAttestation(_) => "CONSENSUS_DUPLICATE_ATTESTATION",
            Self::QuorumNotReached { .. } => "CONSENSUS_QUORUM_NOT_REACHED",
            Self::CertificateAlreadyUsed => "CONSENSUS_CERTIFICATE_ALREADY_USED",
            Self::PastFinalityCheckpoint => "CONSENSUS_PAST_FINALITY_CHECKPOINT",
            Self::ReorgTooDeep { .. } => "CONSENSUS_REORG_TOO_DEEP",
            Self::InsufficientAttackStake => "CONSENSUS_INSUFFICIENT_ATTACK_STAKE",
        }
    }
}

/// Errors raised by the historical-state log (§4.8). These are, per §7,
/// integrity failures: hard fails that must halt the reorg rather than
/// silently falling back to current state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoricalError {
    /// No stored record, frame, or epoch snapshot produced a proposer
    /// queue for the requested height; the reorg must be rejected.
    #[error("no historical state available at height {0}")]
    MissingState(u64),
    /// A loaded snapshot's recomputed hash did not match its stored hash.
    #[error("snapshot hash mismatch at height {0}")]
    SnapshotHashMismatch(u64),
    /// The underlying persistent store reported an error.
    #[error("historical store error: {0}")]
    Store(String),
}

impl ErrorCode for HistoricalError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingState(_) => "HISTORICAL_MISSING_STATE",
            Self::SnapshotHashMismatch(_) => "HISTORICAL_SNAPSHOT_HASH_MISMATCH",
            Self::Store(_) => "HISTORICAL_STORE_ERROR",
        }
    }
}

/// Transient I/O or storage-backend errors. Callers should retry or skip;
/// these must never be promoted to a state change.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The on-disk store rejected a read or write.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A transactional write could not commit atomically.
    #[error("transactional commit failed: {0}")]
    CommitFailed(String),
    /// (De)serialization of a stored record failed.
    #[error("serialization error: {0}")]
    Codec(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORAGE_BACKEND_ERROR",
            Self::CommitFailed(_) => "STORAGE_COMMIT_FAILED",
            Self::Codec(_) => "STORAGE_CODEC_ERROR",
        }
    }
}

/// Errors raised by validator-economics operations (§4.4).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EconomicsError {
    /// The deposit offered was below `MIN_DEPOSIT`.
    #[error("deposit below minimum: have {have}, need {need}")]
    DepositTooLow {
        /// The amount offered.
        have: u128,
        /// The minimum required.
        need: u128,
    },
    /// A withdrawal was requested before the prior one's delay elapsed.
    #[error("withdrawal already pending")]
    WithdrawalAlreadyPending,
    /// A withdrawal was processed before `WITHDRAWAL_DELAY_BLOCKS` elapsed.
    #[error("withdrawal delay not yet elapsed")]
    WithdrawalDelayNotElapsed,
    /// The validator referenced is unknown to the economics layer.
    #[error("unknown validator")]
    UnknownValidator,
}

impl ErrorCode for EconomicsError {
    fn code(&self) -> &'static str {
        match self {
            Self::DepositTooLow { .. } => "ECON_DEPOSIT_TOO_LOW",
            Self::WithdrawalAlreadyPending => "ECON_WITHDRAWAL_ALREADY_PENDING",
            Self::WithdrawalDelayNotElapsed => "ECON_WITHDRAWAL_DELAY_NOT_ELAPSED",
            Self::UnknownValidator => "ECON_UNKNOWN_VALIDATOR",
        }
    }
}

/// The top-level error returned by `Ledger::add_block`, aggregating every
/// rejection category a pre-state check can raise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A block-level structural/consensus/auth check failed.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// A consensus-layer check (proposer, window, reorg gate) failed.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    /// The historical-state log could not support the requested operation.
    #[error(transparent)]
    Historical(#[from] HistoricalError),
    /// A validator-economics rule was violated.
    #[error(transparent)]
    Economics(#[from] EconomicsError),
}

impl ErrorCode for LedgerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Block(e) => e.code(),
            Self::Consensus(e) => e.code(),
            Self::Historical(e) => e.code(),
            Self::Economics(e) => e.code(),
        }
    }
}
