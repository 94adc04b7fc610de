// Path: crates/historical/src/log.rs
//! `HistoricalStateLog`: transactional, checksummed, LRU-cached storage
//! for records, frames, and epoch/attestation-manager snapshots (§4.8).

use crate::frame::ValidatorStateFrame;
use crate::record::HistoricalStateRecord;
use lru::LruCache;
use redb::{ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use timpal_consensus::AttestationSnapshot;
use timpal_storage::{checksum_bytes, verify_checksum, Store};
use timpal_types::error::HistoricalError;
use timpal_types::{Address, Hash256};

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("HISTORICAL_RECORDS");
const FRAMES: TableDefinition<u64, &[u8]> = TableDefinition::new("HISTORICAL_FRAMES");
const EPOCH_SNAPSHOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("HISTORICAL_EPOCH_SNAPSHOTS");
const AM_SNAPSHOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("HISTORICAL_AM_SNAPSHOTS");

const RECORD_CACHE_CAPACITY: usize = 4096;

/// A snapshot of epoch-level state: the ordered committee and epoch
/// seed as of the height the epoch boundary was crossed, consulted by
/// read-path step (d) when no per-height record or frame can produce a
/// proposer source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct EpochSnapshot {
    /// The height at which this epoch snapshot was captured.
    pub captured_at_height: u64,
    /// The epoch this snapshot describes.
    pub epoch_number: u64,
    /// The ordered committee sampled for this epoch.
    pub committee: Vec<Address>,
    /// The epoch seed derived for this epoch.
    pub epoch_seed: Hash256,
}

/// What the reorg-validation read path (§4.8) found for a given height,
/// in priority order. Each variant carries enough information for a
/// caller holding `timpal-consensus`'s VRF functions to resolve a
/// proposer queue; [`ProposerSource::Queue`] already has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposerSource {
    /// The canonical, precomputed queue stored on the record itself.
    Queue(Vec<Address>),
    /// No precomputed queue, but this height's (or its parent's) epoch
    /// seed and combined liveness set are enough to recompute one.
    SeedAndLiveness {
        epoch_seed: Hash256,
        combined_liveness_set: BTreeSet<Address>,
    },
    /// Resolved from the nearest epoch snapshot at or below the height.
    EpochSnapshot {
        epoch_seed: Hash256,
        committee: Vec<Address>,
    },
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HistoricalError> {
    let bytes = bincode::serialize(value).map_err(|e| HistoricalError::Store(e.to_string()))?;
    Ok(checksum_bytes(&bytes))
}

fn decode<T: DeserializeOwned>(stored: &[u8], height: u64) -> Result<T, HistoricalError> {
    let payload =
        verify_checksum(stored).map_err(|_| HistoricalError::SnapshotHashMismatch(height))?;
    bincode::deserialize(payload).map_err(|e| HistoricalError::Store(e.to_string()))
}

/// Per-height immutable state needed to re-derive proposer eligibility
/// and validator-registry state without consulting current ledger
/// state. Writes across its four tables commit or abort together
/// (§4.8).
pub struct HistoricalStateLog {
    store: Store,
    record_cache: Mutex<LruCache<u64, HistoricalStateRecord>>,
}

impl HistoricalStateLog {
    /// Opens a log atop an already-opened [`Store`].
    pub fn open(store: Store) -> Self {
        let capacity =
            NonZeroUsize::new(RECORD_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        HistoricalStateLog {
            store,
            record_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Writes the record, frame, and attestation-manager snapshot for a
    /// height, plus an epoch snapshot when one was captured at this
    /// height, all inside a single transaction.
    pub fn commit(
        &self,
        record: HistoricalStateRecord,
        frame: ValidatorStateFrame,
        am_snapshot: AttestationSnapshot,
        epoch_snapshot: Option<EpochSnapshot>,
    ) -> Result<(), HistoricalError> {
        let height = record.height;
        let record_bytes = encode(&record)?;
        let frame_bytes = encode(&frame)?;
        let am_bytes = encode(&am_snapshot)?;
        let epoch_bytes = epoch_snapshot.as_ref().map(encode).transpose()?;

        self.store
            .write(|txn| {
                let mut records = txn
                    .open_table(RECORDS)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                records
                    .insert(height, record_bytes.as_slice())
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;

                let mut frames = txn
                    .open_table(FRAMES)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                frames
                    .insert(height, frame_bytes.as_slice())
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;

                let mut am = txn
                    .open_table(AM_SNAPSHOTS)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                am.insert(height, am_bytes.as_slice())
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;

                if let Some(bytes) = &epoch_bytes {
                    let mut epochs = txn.open_table(EPOCH_SNAPSHOTS).map_err(|e| {
                        timpal_types::error::StorageError::Backend(e.to_string())
                    })?;
                    epochs
                        .insert(height, bytes.as_slice())
                        .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                }
                Ok(())
            })
            .map_err(|e| HistoricalError::Store(e.to_string()))?;

        if let Ok(mut cache) = self.record_cache.lock() {
            cache.put(height, record);
        }
        Ok(())
    }

    /// Returns the record at `height`, if any.
    pub fn record_at(&self, height: u64) -> Result<Option<HistoricalStateRecord>, HistoricalError> {
        if let Ok(mut cache) = self.record_cache.lock() {
            if let Some(record) = cache.get(&height) {
                return Ok(Some(record.clone()));
            }
        }
        let loaded = self
            .store
            .read(|txn| {
                let table = txn
                    .open_table(RECORDS)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                let value = table
                    .get(height)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?
                    .map(|v| v.value().to_vec());
                Ok(value)
            })
            .map_err(|e| HistoricalError::Store(e.to_string()))?;

        match loaded {
            None => Ok(None),
            Some(bytes) => {
                let record: HistoricalStateRecord = decode(&bytes, height)?;
                if let Ok(mut cache) = self.record_cache.lock() {
                    cache.put(height, record.clone());
                }
                Ok(Some(record))
            }
        }
    }

    /// Returns the frame at `height`, if any.
    pub fn frame_at(&self, height: u64) -> Result<Option<ValidatorStateFrame>, HistoricalError> {
        self.load(FRAMES, height)
    }

    /// Returns the attestation-manager snapshot at `height`, if any.
    pub fn am_snapshot_at(
        &self,
        height: u64,
    ) -> Result<Option<AttestationSnapshot>, HistoricalError> {
        self.load(AM_SNAPSHOTS, height)
    }

    /// Returns the nearest epoch snapshot captured at or below `height`.
    pub fn nearest_epoch_snapshot_at_or_below(
        &self,
        height: u64,
    ) -> Result<Option<EpochSnapshot>, HistoricalError> {
        let loaded = self
            .store
            .read(|txn| {
                let table = txn
                    .open_table(EPOCH_SNAPSHOTS)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                let mut range = table
                    .range(..=height)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                let value = range
                    .next_back()
                    .transpose()
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?
                    .map(|(_, v)| v.value().to_vec());
                Ok(value)
            })
            .map_err(|e| HistoricalError::Store(e.to_string()))?;

        loaded.map(|bytes| decode(&bytes, height)).transpose()
    }

    fn load<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<u64, &'static [u8]>,
        height: u64,
    ) -> Result<Option<T>, HistoricalError> {
        let loaded = self
            .store
            .read(|txn| {
                let table = txn
                    .open_table(table_def)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
                let value = table
                    .get(height)
                    .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?
                    .map(|v| v.value().to_vec());
                Ok(value)
            })
            .map_err(|e| HistoricalError::Store(e.to_string()))?;
        loaded.map(|bytes| decode(&bytes, height)).transpose()
    }

    /// Resolves a proposer source for `height` following §4.8's read
    /// path: (a) the precomputed queue on the record at `height`; (b)
    /// that same record's own epoch seed and combined liveness set; (c)
    /// the same fields on the parent record at `height - 1`; (d) the
    /// nearest epoch snapshot at or below `height`. Returns
    /// [`HistoricalError::MissingState`] if none apply — callers must
    /// reject the reorg rather than fall back to current state.
    pub fn resolve_proposer_source(
        &self,
        height: u64,
    ) -> Result<ProposerSource, HistoricalError> {
        if let Some(record) = self.record_at(height)? {
            if !record.proposer_queue.is_empty() {
                return Ok(ProposerSource::Queue(record.proposer_queue));
            }
            return Ok(ProposerSource::SeedAndLiveness {
                epoch_seed: record.epoch_seed,
                combined_liveness_set: record.combined_liveness_set,
            });
        }

        if height > 0 {
            if let Some(parent) = self.record_at(height - 1)? {
                return Ok(ProposerSource::SeedAndLiveness {
                    epoch_seed: parent.epoch_seed,
                    combined_liveness_set: parent.combined_liveness_set,
                });
            }
        }

        if let Some(snapshot) = self.nearest_epoch_snapshot_at_or_below(height)? {
            return Ok(ProposerSource::EpochSnapshot {
                epoch_seed: snapshot.epoch_seed,
                committee: snapshot.committee,
            });
        }

        Err(HistoricalError::MissingState(height))
    }

    /// Atomically deletes every record, frame, epoch snapshot, and
    /// attestation-manager snapshot with height strictly greater than
    /// `height`.
    pub fn remove_above_height(&self, height: u64) -> Result<(), HistoricalError> {
        self.store
            .write(|txn| {
                delete_above(txn, RECORDS, height)?;
                delete_above(txn, FRAMES, height)?;
                delete_above(txn, AM_SNAPSHOTS, height)?;
                delete_above(txn, EPOCH_SNAPSHOTS, height)?;
                Ok(())
            })
            .map_err(|e| HistoricalError::Store(e.to_string()))?;

        if let Ok(mut cache) = self.record_cache.lock() {
            let stale: Vec<u64> = cache
                .iter()
                .filter(|(h, _)| **h > height)
                .map(|(h, _)| *h)
                .collect();
            for h in stale {
                cache.pop(&h);
            }
        }
        Ok(())
    }
}

fn delete_above(
    txn: &redb::WriteTransaction<'_>,
    table_def: TableDefinition<u64, &'static [u8]>,
    height: u64,
) -> Result<(), timpal_types::error::StorageError> {
    let mut table = txn
        .open_table(table_def)
        .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
    let stale: Vec<u64> = table
        .range((height + 1)..)
        .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?
        .filter_map(|entry| entry.ok().map(|(k, _)| k.value()))
        .collect();
    for key in stale {
        table
            .remove(key)
            .map_err(|e| timpal_types::error::StorageError::Backend(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::LivenessFilterState;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("tmpl{}", hex::encode([n; 22]))).unwrap()
    }

    fn liveness() -> LivenessFilterState {
        LivenessFilterState {
            recent_proposers: BTreeSet::new(),
            grace_period_validators: BTreeSet::new(),
            combined_liveness_set: BTreeSet::from([addr(1)]),
            lookback_blocks: 30,
            grace_window_blocks: 100,
        }
    }

    fn open_log() -> (tempfile::TempDir, HistoricalStateLog) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("historical.redb")).unwrap();
        (dir, HistoricalStateLog::open(store))
    }

    #[test]
    fn commit_then_read_round_trips() {
        let (_dir, log) = open_log();
        let record = HistoricalStateRecord::new(
            10,
            Hash256::zero(),
            Hash256::zero(),
            0,
            &liveness(),
            vec![addr(1), addr(2)],
            0,
            Hash256::zero(),
        );
        let frame = ValidatorStateFrame::full(10, Hash256::zero(), Vec::new(), liveness(), Hash256::zero(), 0);
        let am = AttestationSnapshot {
            height: 10,
            attestations: Default::default(),
            committees: Default::default(),
            finalized_epochs: Default::default(),
            snapshot_hash: Hash256::zero(),
        };
        log.commit(record.clone(), frame, am, None).unwrap();

        assert_eq!(log.record_at(10).unwrap(), Some(record));
        assert!(log.frame_at(10).unwrap().is_some());
        assert!(log.am_snapshot_at(10).unwrap().is_some());
    }

    #[test]
    fn resolve_prefers_precomputed_queue() {
        let (_dir, log) = open_log();
        let record = HistoricalStateRecord::new(
            10,
            Hash256::zero(),
            Hash256::zero(),
            0,
            &liveness(),
            vec![addr(1), addr(2)],
            0,
            Hash256::zero(),
        );
        let frame = ValidatorStateFrame::full(10, Hash256::zero(), Vec::new(), liveness(), Hash256::zero(), 0);
        let am = AttestationSnapshot {
            height: 10,
            attestations: Default::default(),
            committees: Default::default(),
            finalized_epochs: Default::default(),
            snapshot_hash: Hash256::zero(),
        };
        log.commit(record, frame, am, None).unwrap();

        let source = log.resolve_proposer_source(10).unwrap();
        assert_eq!(source, ProposerSource::Queue(vec![addr(1), addr(2)]));
    }

    #[test]
    fn resolve_falls_back_to_parent_record() {
        let (_dir, log) = open_log();
        let record = HistoricalStateRecord::new(
            9,
            Hash256::zero(),
            Hash256::from_bytes([7u8; 32]),
            0,
            &liveness(),
            vec![addr(1)],
            0,
            Hash256::zero(),
        );
        let frame = ValidatorStateFrame::full(9, Hash256::zero(), Vec::new(), liveness(), Hash256::zero(), 0);
        let am = AttestationSnapshot {
            height: 9,
            attestations: Default::default(),
            committees: Default::default(),
            finalized_epochs: Default::default(),
            snapshot_hash: Hash256::zero(),
        };
        log.commit(record, frame, am, None).unwrap();

        let source = log.resolve_proposer_source(10).unwrap();
        assert_eq!(
            source,
            ProposerSource::SeedAndLiveness {
                epoch_seed: Hash256::from_bytes([7u8; 32]),
                combined_liveness_set: BTreeSet::from([addr(1)]),
            }
        );
    }

    #[test]
    fn resolve_errors_when_nothing_available() {
        let (_dir, log) = open_log();
        let err = log.resolve_proposer_source(100).unwrap_err();
        assert_eq!(err, HistoricalError::MissingState(100));
    }

    #[test]
    fn remove_above_height_truncates_everything() {
        let (_dir, log) = open_log();
        for h in [10u64, 20, 30] {
            let record = HistoricalStateRecord::new(
                h,
                Hash256::zero(),
                Hash256::zero(),
                0,
                &liveness(),
                vec![addr(1)],
                0,
                Hash256::zero(),
            );
            let frame =
                ValidatorStateFrame::full(h, Hash256::zero(), Vec::new(), liveness(), Hash256::zero(), 0);
            let am = AttestationSnapshot {
                height: h,
                attestations: Default::default(),
                committees: Default::default(),
                finalized_epochs: Default::default(),
                snapshot_hash: Hash256::zero(),
            };
            log.commit(record, frame, am, None).unwrap();
        }

        log.remove_above_height(20).unwrap();
        assert!(log.record_at(10).unwrap().is_some());
        assert!(log.record_at(20).unwrap().is_some());
        assert!(log.record_at(30).unwrap().is_none());
    }
}
