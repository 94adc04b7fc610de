// Path: crates/consensus/src/attestation.rs
//! Per-epoch committee sampling and liveness attestation (§4.5).

use crate::config::ConsensusConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use timpal_crypto::sha256_hash256;
use timpal_types::codec::to_canonical_json;
use timpal_types::error::ConsensusError;
use timpal_types::{Address, Hash256};

/// A verifiable, hash-chained export of all attestation state at a given
/// height, used to restore the manager during reorg rollback (§4.5, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationSnapshot {
    /// Height this snapshot was taken at.
    pub height: u64,
    /// Recorded attestations, epoch -> (validator -> attested block height).
    pub attestations: BTreeMap<u64, BTreeMap<Address, u64>>,
    /// Cached committees, epoch -> sorted committee members.
    pub committees: BTreeMap<u64, Vec<Address>>,
    /// Epochs that have been finalized.
    pub finalized_epochs: BTreeSet<u64>,
    /// SHA-256 of the canonical JSON of the fields above.
    pub snapshot_hash: Hash256,
}

#[derive(Serialize)]
struct SnapshotPayload<'a> {
    height: u64,
    attestations: &'a BTreeMap<u64, BTreeMap<Address, u64>>,
    committees: &'a BTreeMap<u64, Vec<Address>>,
    finalized_epochs: &'a BTreeSet<u64>,
}

/// Tracks, per epoch, which rotating committee of validators is sampled
/// to prove liveness, and which of them have attested.
#[derive(Debug, Clone, Default)]
pub struct AttestationManager {
    config_epoch_length: u64,
    config_attestation_window: u64,
    config_committee_size: usize,
    attestations: BTreeMap<u64, BTreeMap<Address, u64>>,
    committees: BTreeMap<u64, Vec<Address>>,
    finalized_epochs: BTreeSet<u64>,
}

impl AttestationManager {
    /// Builds a manager using the given consensus configuration.
    pub fn new(config: &ConsensusConfig) -> Self {
        AttestationManager {
            config_epoch_length: config.epoch_length,
            config_attestation_window: config.attestation_window,
            config_committee_size: config.committee_size,
            attestations: BTreeMap::new(),
            committees: BTreeMap::new(),
            finalized_epochs: BTreeSet::new(),
        }
    }

    /// `epoch_of(height) = height / epoch_length`.
    pub fn epoch_of(&self, height: u64) -> u64 {
        height / self.config_epoch_length
    }

    /// `epoch_start(e) = e * epoch_length`.
    pub fn epoch_start(&self, epoch: u64) -> u64 {
        epoch * self.config_epoch_length
    }

    /// `deadline(e) = epoch_start(e) + attestation_window - 1`.
    pub fn deadline(&self, epoch: u64) -> u64 {
        self.epoch_start(epoch) + self.config_attestation_window.saturating_sub(1)
    }

    /// Samples (or returns the cached) committee for `epoch` from
    /// `all_validators`. If the validator set is at or below
    /// `committee_size`, the whole set is the committee. Otherwise
    /// validators are sorted by `sha256("epoch_{e}_{address}")` ascending
    /// and the first `committee_size` are taken.
    pub fn select_committee(&mut self, epoch: u64, all_validators: &[Address]) -> Vec<Address> {
        if let Some(cached) = self.committees.get(&epoch) {
            return cached.clone();
        }

        let committee = if all_validators.len() <= self.config_committee_size {
            let mut sorted: Vec<Address> = all_validators.to_vec();
            sorted.sort();
            sorted
        } else {
            let mut scored: Vec<(Hash256, Address)> = all_validators
                .iter()
                .map(|address| {
                    let key = format!("epoch_{epoch}_{address}");
                    (sha256_hash256(key.as_bytes()), address.clone())
                })
                .collect();
            scored.sort();
            scored
                .into_iter()
                .take(self.config_committee_size)
                .map(|(_, address)| address)
                .collect()
        };

        self.committees.insert(epoch, committee.clone());
        committee
    }

    /// Validates that `validator` may attest for `epoch` at `block_height`,
    /// without recording the attestation.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_attestation(
        &self,
        epoch: u64,
        validator: &Address,
        block_height: u64,
        current_epoch: u64,
        committee: &[Address],
        skip_committee_check: bool,
    ) -> Result<(), ConsensusError> {
        if epoch > current_epoch {
            return Err(ConsensusError::AttestationFutureEpoch(epoch));
        }
        if current_epoch > 0 && epoch < current_epoch - 1 {
            return Err(ConsensusError::AttestationTooOld(epoch));
        }
        if !skip_committee_check && !committee.contains(validator) {
            return Err(ConsensusError::NotCommitteeMember(epoch));
        }
        let window = self.epoch_start(epoch)..=self.deadline(epoch);
        if !window.contains(&block_height) {
            return Err(ConsensusError::AttestationOutOfWindow);
        }
        if self
            .attestations
            .get(&epoch)
            .is_some_and(|by_validator| by_validator.contains_key(validator))
        {
            return Err(ConsensusError::DuplicateAttestation(epoch));
        }
        Ok(())
    }

    /// Records a validated attestation. Callers must have already run
    /// [`AttestationManager::validate_attestation`] successfully.
    pub fn record_attestation(&mut self, epoch: u64, validator: Address, block_height: u64) {
        self.attestations
            .entry(epoch)
            .or_default()
            .insert(validator, block_height);
    }

    /// Whether `validator` has an attestation recorded in `epoch` or the
    /// epoch before it — used by the liveness filter (§4.9).
    pub fn attested_recently(&self, validator: &Address, current_epoch: u64) -> bool {
        let recent = [current_epoch, current_epoch.saturating_sub(1)];
        recent.iter().any(|epoch| {
            self.attestations
                .get(epoch)
                .is_some_and(|by_validator| by_validator.contains_key(validator))
        })
    }

    /// Marks `epoch` as finalized.
    pub fn finalize_epoch(&mut self, epoch: u64) {
        self.finalized_epochs.insert(epoch);
    }

    /// Exports a hash-verified snapshot of all attestation state.
    pub fn export_snapshot(&self, height: u64) -> Result<AttestationSnapshot, serde_json::Error> {
        let payload = SnapshotPayload {
            height,
            attestations: &self.attestations,
            committees: &self.committees,
            finalized_epochs: &self.finalized_epochs,
        };
        let bytes = to_canonical_json(&payload)?;
        Ok(AttestationSnapshot {
            height,
            attestations: self.attestations.clone(),
            committees: self.committees.clone(),
            finalized_epochs: self.finalized_epochs.clone(),
            snapshot_hash: sha256_hash256(bytes),
        })
    }

    /// Restores state from `snapshot`, refusing if its recomputed hash
    /// does not match `snapshot.snapshot_hash`.
    pub fn import_snapshot(&mut self, snapshot: &AttestationSnapshot) -> Result<(), ConsensusError> {
        let payload = SnapshotPayload {
            height: snapshot.height,
            attestations: &snapshot.attestations,
            committees: &snapshot.committees,
            finalized_epochs: &snapshot.finalized_epochs,
        };
        let bytes = to_canonical_json(&payload)
            .map_err(|_| ConsensusError::PastFinalityCheckpoint)?;
        let recomputed = sha256_hash256(bytes);
        if recomputed != snapshot.snapshot_hash {
            return Err(ConsensusError::PastFinalityCheckpoint);
        }
        self.attestations = snapshot.attestations.clone();
        self.committees = snapshot.committees.clone();
        self.finalized_epochs = snapshot.finalized_epochs.clone();
        Ok(())
    }

    /// Deletes all attestations recorded strictly above `height`.
    pub fn rollback_to_height(&mut self, height: u64) {
        for by_validator in self.attestations.values_mut() {
            by_validator.retain(|_, attested_height| *attested_height <= height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("tmpl{}", hex::encode([n; 22]))).unwrap()
    }

    #[test]
    fn small_validator_set_is_its_own_committee() {
        let mut mgr = AttestationManager::new(&ConsensusConfig::default());
        let validators = vec![addr(1), addr(2), addr(3)];
        let committee = mgr.select_committee(0, &validators);
        assert_eq!(committee.len(), 3);
    }

    #[test]
    fn committee_selection_is_deterministic_and_sized() {
        let mut a = AttestationManager::new(&ConsensusConfig::default());
        let mut b = AttestationManager::new(&ConsensusConfig::default());
        let validators: Vec<Address> = (0..50).map(addr).collect();
        let config = ConsensusConfig {
            committee_size: 10,
            ..ConsensusConfig::default()
        };
        a.config_committee_size = config.committee_size;
        b.config_committee_size = config.committee_size;
        let ca = a.select_committee(7, &validators);
        let cb = b.select_committee(7, &validators);
        assert_eq!(ca.len(), 10);
        assert_eq!(ca, cb);
    }

    #[test]
    fn validate_rejects_future_epoch() {
        let mgr = AttestationManager::new(&ConsensusConfig::default());
        let err = mgr
            .validate_attestation(5, &addr(1), 500, 3, &[addr(1)], true)
            .unwrap_err();
        assert_eq!(err, ConsensusError::AttestationFutureEpoch(5));
    }

    #[test]
    fn validate_rejects_non_committee_member() {
        let mgr = AttestationManager::new(&ConsensusConfig::default());
        let err = mgr
            .validate_attestation(0, &addr(1), 5, 0, &[addr(2)], false)
            .unwrap_err();
        assert_eq!(err, ConsensusError::NotCommitteeMember(0));
    }

    #[test]
    fn record_then_duplicate_is_rejected() {
        let mut mgr = AttestationManager::new(&ConsensusConfig::default());
        mgr.validate_attestation(0, &addr(1), 5, 0, &[addr(1)], false)
            .unwrap();
        mgr.record_attestation(0, addr(1), 5);
        let err = mgr
            .validate_attestation(0, &addr(1), 6, 0, &[addr(1)], false)
            .unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateAttestation(0));
    }

    #[test]
    fn export_import_round_trips() {
        let mut mgr = AttestationManager::new(&ConsensusConfig::default());
        mgr.select_committee(0, &[addr(1), addr(2)]);
        mgr.record_attestation(0, addr(1), 10);
        let snapshot = mgr.export_snapshot(10).unwrap();

        let mut restored = AttestationManager::new(&ConsensusConfig::default());
        restored.import_snapshot(&snapshot).unwrap();
        assert_eq!(restored.attestations, mgr.attestations);
    }

    #[test]
    fn import_rejects_tampered_snapshot() {
        let mut mgr = AttestationManager::new(&ConsensusConfig::default());
        mgr.record_attestation(0, addr(1), 10);
        let mut snapshot = mgr.export_snapshot(10).unwrap();
        snapshot.attestations.entry(0).or_default().insert(addr(9), 1);

        let mut restored = AttestationManager::new(&ConsensusConfig::default());
        assert!(restored.import_snapshot(&snapshot).is_err());
    }

    #[test]
    fn rollback_removes_future_attestations() {
        let mut mgr = AttestationManager::new(&ConsensusConfig::default());
        mgr.record_attestation(0, addr(1), 10);
        mgr.record_attestation(0, addr(2), 20);
        mgr.rollback_to_height(15);
        assert!(mgr.attestations.get(&0).unwrap().contains_key(&addr(1)));
        assert!(!mgr.attestations.get(&0).unwrap().contains_key(&addr(2)));
    }
}
