use crate::StoreError;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// What happened during [`StoreBackend::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No value under the key; the closure was not called.
    Missing,
    /// The closure declined to write.
    Unchanged,
    /// The closure's value replaced the old one.
    Written,
}

/// Key-value storage for encoded records.
///
/// Implementations must make [`update`](StoreBackend::update) atomic: no other
/// write to the same key may land between the read handed to the closure and
/// the write of its result. The status transition relies on this.
pub trait StoreBackend: Send + Sync {
    /// Insert a value only if the key is absent. Returns `false` when it already exists.
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;
    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Atomic read-modify-write. `apply` receives the current value and returns
    /// `Some(new)` to replace it or `None` to leave it untouched.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&[u8]) -> Result<Option<Vec<u8>>, StoreError>,
    ) -> Result<UpdateOutcome, StoreError>;
    /// Visit every value in key order from one consistent view of the data.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (tests, demos)
/// let config = BackendConfig::in_memory();
///
/// // Redb file
/// let config = BackendConfig::redb("/data/faces.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Redb embedded database at `path`.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// A `BTreeMap` behind a lock. Contents are lost on drop.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend described by this config.
    pub fn build(&self) -> Result<Arc<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Arc::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend using a `RwLock` around a `BTreeMap`.
///
/// Scans hold the read lock only while copying the values out; the visitor
/// runs after it is released, so writers never wait on decoding.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for InMemoryBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        if guard.contains_key(key) {
            return Ok(false);
        }
        guard.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&[u8]) -> Result<Option<Vec<u8>>, StoreError>,
    ) -> Result<UpdateOutcome, StoreError> {
        // The write lock spans the read, the decision and the write.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let Some(current) = guard.get_mut(key) else {
            return Ok(UpdateOutcome::Missing);
        };
        match apply(current)? {
            Some(next) => {
                *current = next;
                Ok(UpdateOutcome::Written)
            }
            None => Ok(UpdateOutcome::Unchanged),
        }
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let values: Vec<Vec<u8>> = {
            let guard = self
                .records
                .read()
                .map_err(|_| StoreError::backend("poisoned lock"))?;
            guard.values().cloned().collect()
        };
        for value in &values {
            visitor(value)?;
        }
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
