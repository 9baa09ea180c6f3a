//! Redb (Rust embedded database) backend for face record storage.
//!
//! Redb gives us what the matching core needs from a backing store:
//! - MVCC read transactions, so a snapshot is a true point-in-time view and
//!   never blocks a concurrent writer
//! - serialized write transactions, so a read-check-write inside one write
//!   transaction is a compare-and-swap
//! - crash-safe commits
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   backend: "redb"
//!   path: "/data/faces.redb"
//! ```

use crate::backend::{StoreBackend, UpdateOutcome};
use crate::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Record id -> encoded record.
const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("face_records");

/// Redb backend for persistent record storage.
///
/// `Arc<Database>` lets the handle move into blocking tasks; redb does its own
/// locking internally.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// # Example
    /// ```no_run
    /// use store::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/faces.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::backend(e.to_string()))?;

        // Opening the table inside a write txn creates it on first use.
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        let inserted = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let exists = table
                .get(key)
                .map_err(|e| StoreError::backend(e.to_string()))?
                .is_some();
            if exists {
                false
            } else {
                table
                    .insert(key, value)
                    .map_err(|e| StoreError::backend(e.to_string()))?;
                true
            }
        };

        if inserted {
            write_txn
                .commit()
                .map_err(|e| StoreError::backend(e.to_string()))?;
        } else {
            write_txn
                .abort()
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        Ok(inserted)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;

        match table
            .get(key)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&[u8]) -> Result<Option<Vec<u8>>, StoreError>,
    ) -> Result<UpdateOutcome, StoreError> {
        // Redb admits one write transaction at a time, so nothing else can
        // write `key` between our read and our insert.
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        let outcome = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let current = table
                .get(key)
                .map_err(|e| StoreError::backend(e.to_string()))?
                .map(|value| value.value().to_vec());

            match current {
                None => UpdateOutcome::Missing,
                Some(current) => match apply(&current)? {
                    Some(next) => {
                        table
                            .insert(key, next.as_slice())
                            .map_err(|e| StoreError::backend(e.to_string()))?;
                        UpdateOutcome::Written
                    }
                    None => UpdateOutcome::Unchanged,
                },
            }
        };

        match outcome {
            UpdateOutcome::Written => write_txn
                .commit()
                .map_err(|e| StoreError::backend(e.to_string()))?,
            UpdateOutcome::Missing | UpdateOutcome::Unchanged => write_txn
                .abort()
                .map_err(|e| StoreError::backend(e.to_string()))?,
        }
        Ok(outcome)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;

        for item in table
            .iter()
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            let (_, value) = item.map_err(|e| StoreError::backend(e.to_string()))?;
            visitor(value.value())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn insert_new_and_get() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        assert!(backend.insert_new("key1", b"value1").unwrap());
        assert!(!backend.insert_new("key1", b"other").unwrap());
        assert_eq!(backend.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn update_is_conditional() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        assert_eq!(
            backend.update("missing", &mut |_| Ok(None)).unwrap(),
            UpdateOutcome::Missing
        );

        backend.insert_new("k", b"missing").unwrap();
        let flip = &mut |current: &[u8]| -> Result<Option<Vec<u8>>, StoreError> {
            if current == b"missing" {
                Ok(Some(b"found".to_vec()))
            } else {
                Ok(None)
            }
        };
        assert_eq!(backend.update("k", flip).unwrap(), UpdateOutcome::Written);
        assert_eq!(backend.update("k", flip).unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(backend.get("k").unwrap(), Some(b"found".to_vec()));
    }

    #[test]
    fn scan_visits_every_value() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.insert_new("key2", b"value2").unwrap();
        backend.insert_new("key1", b"value1").unwrap();

        let mut collected = Vec::new();
        backend
            .scan(&mut |value| {
                collected.push(value.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(collected, vec![b"value1".to_vec(), b"value2".to_vec()]);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.insert_new("persisted", b"yes").unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(backend.get("persisted").unwrap(), Some(b"yes".to_vec()));
    }
}
