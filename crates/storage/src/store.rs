// Path: crates/storage/src/store.rs
//! The on-disk database handle and its transaction helpers.

use redb::Database;
use std::path::Path;
use std::sync::Arc;
use timpal_types::error::StorageError;

/// A single `redb` database, opened exclusive-write by the consensus
/// node (§4.11: "The persistent store must be opened exclusive-write on
/// the consensus node and read-only elsewhere").
///
/// Callers define their own [`redb::TableDefinition`] consts for the
/// tables they own (as the upstream storage layer does) and drive them
/// through [`Store::write`] / [`Store::read`], which hand back the raw
/// `redb` transaction so every table touched inside one closure commits
/// or aborts together.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Opens (creating if absent) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Store { db: Arc::new(db) })
    }

    /// Runs `f` inside a single write transaction. Every table `f` opens
    /// and mutates commits together when `f` returns `Ok`; on `Err`, or
    /// if `f` panics, nothing is committed.
    pub fn write<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&redb::WriteTransaction<'_>) -> Result<T, StorageError>,
    {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = f(&txn)?;
        txn.commit()
            .map_err(|e| StorageError::CommitFailed(e.to_string()))?;
        Ok(result)
    }

    /// Runs `f` inside a read-only transaction.
    pub fn read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&redb::ReadTransaction<'_>) -> Result<T, StorageError>,
    {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        f(&txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::{ReadableTable, TableDefinition};

    const T: TableDefinition<u64, &[u8]> = TableDefinition::new("T");

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db.redb")).unwrap();

        store
            .write(|txn| {
                let mut table = txn
                    .open_table(T)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                table
                    .insert(1u64, b"hello".as_slice())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(())
            })
            .unwrap();

        let value = store
            .read(|txn| {
                let table = txn
                    .open_table(T)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let got = table
                    .get(1u64)
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                    .map(|v| v.value().to_vec());
                Ok(got)
            })
            .unwrap();

        assert_eq!(value, Some(b"hello".to_vec()));
    }

    #[test]
    fn failed_closure_aborts_the_whole_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db.redb")).unwrap();

        let err = store.write(|txn| -> Result<(), StorageError> {
            let mut table = txn
                .open_table(T)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            table
                .insert(1u64, b"partial".as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Err(StorageError::Backend("simulated failure".into()))
        });
        assert!(err.is_err());

        let value = store
            .read(|txn| {
                let table = txn
                    .open_table(T)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let got = table
                    .get(1u64)
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                    .map(|v| v.value().to_vec());
                Ok(got)
            })
            .unwrap();
        assert_eq!(value, None);
    }
}
