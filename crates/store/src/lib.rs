//! # Face record store
//!
//! This crate owns the records the matching engine compares against: registered
//! users and reported missing persons, each optionally carrying a face
//! embedding. It provides two things to the rest of the workspace:
//!
//! - A point-in-time **snapshot** of candidate records for one matching pass.
//! - An atomic **Missing → Found** conditional write, so concurrent matches of
//!   the same missing person flip its status exactly once.
//!
//! ## Layers
//!
//! - [`StoreBackend`]: byte-level key-value storage with an atomic
//!   read-modify-write primitive. Ships with an in-memory `BTreeMap` backend and
//!   a [redb](https://docs.rs/redb) backend (feature `backend-redb`, on by
//!   default).
//! - [`FaceStore`]: typed records on top of a backend. Records are bincode
//!   encoded inside a schema-versioned envelope and optionally zstd compressed.
//! - [`RecordStore`]: the async interface the matching service consumes.
//!   `FaceStore` implements it by moving blocking backend work onto tokio's
//!   blocking pool.
//!
//! ## Example
//!
//! ```
//! use store::{CandidateScope, FaceStore, Record, StoreConfig};
//!
//! let store = FaceStore::new(StoreConfig::default()).unwrap();
//! store.insert_record(Record::user("u-1", vec![0.1, 0.2, 0.3])).unwrap();
//! store.insert_record(Record::missing_person("mp-1", vec![0.3, 0.2, 0.1])).unwrap();
//!
//! let snapshot = store.load_snapshot(CandidateScope::All).unwrap();
//! assert_eq!(snapshot.len(), 2);
//!
//! let outcome = store.mark_found("mp-1").unwrap();
//! assert!(outcome.is_transitioned());
//! assert!(!store.mark_found("mp-1").unwrap().is_transitioned());
//! ```

mod backend;
mod query;
mod record_store;
mod transition;
mod types;

use std::sync::Arc;

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zstd::{decode_all, encode_all};

#[cfg(feature = "backend-redb")]
pub use crate::backend::RedbBackend;
pub use crate::backend::{BackendConfig, InMemoryBackend, StoreBackend, UpdateOutcome};
pub use crate::record_store::RecordStore;
pub use crate::types::{
    CandidateScope, Embedding, PersonStatus, Record, RecordKind, TransitionOutcome,
};

/// Bump this value whenever the encoded `Record` layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    schema_version: u16,
    record: Record,
}

/// Compression codec options for stored records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    /// Store bincode bytes as-is. Float embeddings barely compress, so this is the default.
    #[default]
    None,
    /// Zstd compression.
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for opening a [`FaceStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
    /// Offer missing persons already marked `Found` as match candidates.
    /// Off by default: once found, a person is no longer searched for.
    pub include_found: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_include_found(mut self, include_found: bool) -> Self {
        self.include_found = include_found;
        self
    }
}

/// Errors produced by the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("record encode error: {0}")]
    Encode(String),
    #[error("record decode error: {0}")]
    Decode(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("unsupported record schema version {found} (expected {expected})")]
    SchemaMismatch { found: u16, expected: u16 },
    #[error("record id must not be empty")]
    EmptyId,
    #[error("record `{0}` already exists")]
    DuplicateId(String),
    /// The store could not be reached (blocking task lost, runtime shutting down).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Compression(e.to_string())
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Typed record storage over a [`StoreBackend`].
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct FaceStore {
    backend: Arc<dyn StoreBackend>,
    cfg: StoreConfig,
}

impl FaceStore {
    /// Open the backend described by `cfg`.
    pub fn new(cfg: StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(cfg, backend))
    }

    /// Build a store over an existing backend (dependency injection, tests).
    pub fn with_backend(cfg: StoreConfig, backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend, cfg }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    /// Insert a new record. Existing ids are rejected, never overwritten, so a
    /// found person cannot be re-registered as missing under the same id.
    pub fn insert_record(&self, record: Record) -> Result<(), StoreError> {
        if record.id.trim().is_empty() {
            return Err(StoreError::EmptyId);
        }
        let payload = self.encode_record(&record)?;
        if !self.backend.insert_new(&record.id, &payload)? {
            return Err(StoreError::DuplicateId(record.id));
        }
        debug!(
            record_id = %record.id,
            kind = record.kind.label(),
            dimension = record.embedding.as_ref().map(|e| e.dimension()).unwrap_or(0),
            "record_inserted"
        );
        Ok(())
    }

    /// Retrieve a record by id.
    pub fn get_record(&self, id: &str) -> Result<Option<Record>, StoreError> {
        match self.backend.get(id)? {
            Some(data) => Ok(Some(self.decode_record(&data)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn decode_record(&self, data: &[u8]) -> Result<Record, StoreError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (stored, _): (StoredRecord, usize) = decode_from_slice(&decompressed, standard())?;
        if stored.schema_version != STORE_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                found: stored.schema_version,
                expected: STORE_SCHEMA_VERSION,
            });
        }
        Ok(stored.record)
    }

    pub(crate) fn encode_record(&self, record: &Record) -> Result<Vec<u8>, StoreError> {
        let stored = StoredRecord {
            schema_version: STORE_SCHEMA_VERSION,
            record: record.clone(),
        };
        let encoded = encode_to_vec(&stored, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}

impl std::fmt::Debug for FaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceStore").field("cfg", &self.cfg).finish()
    }
}
