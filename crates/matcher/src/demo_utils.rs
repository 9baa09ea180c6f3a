//! Fixtures shared by unit tests, integration tests, benches and the demo
//! binary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use store::{
    CandidateScope, Embedding, FaceStore, InMemoryBackend, PersonStatus, Record, RecordStore,
    StoreConfig, StoreError, TransitionOutcome,
};

use crate::extract::{EmbeddingExtractor, ExtractError};

/// In-memory store seeded with `records`.
///
/// Panics on a duplicate id; fixtures are expected to be well formed.
pub fn seeded_store(records: Vec<Record>) -> FaceStore {
    let store = FaceStore::with_backend(StoreConfig::default(), Arc::new(InMemoryBackend::new()));
    for record in records {
        if let Err(err) = store.insert_record(record) {
            panic!("failed to seed demo store: {err}");
        }
    }
    store
}

/// [`seeded_store`] behind an `Arc`, ready to hand to a `MatchService`.
pub fn in_memory_store(records: Vec<Record>) -> Arc<FaceStore> {
    Arc::new(seeded_store(records))
}

/// `dim`-dimensional vector that is zero except for `value` at `index`.
pub fn axis_vector(dim: usize, index: usize, value: f32) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    if let Some(slot) = v.get_mut(index) {
        *slot = value;
    }
    v
}

/// Store wrapper whose snapshot and status write can be made to fail or stall.
pub struct FlakyStore {
    inner: FaceStore,
    fail_snapshots: AtomicBool,
    fail_transitions: AtomicBool,
    transition_delay: Mutex<Option<Duration>>,
    acknowledgement_delay: Mutex<Option<Duration>>,
    transition_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            inner: seeded_store(records),
            fail_snapshots: AtomicBool::new(false),
            fail_transitions: AtomicBool::new(false),
            transition_delay: Mutex::new(None),
            acknowledgement_delay: Mutex::new(None),
            transition_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    pub fn delay_transitions(&self, delay: Option<Duration>) {
        *self
            .transition_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    /// Let status writes land, then hold back the reply for `delay`.
    pub fn delay_acknowledgements(&self, delay: Option<Duration>) {
        *self
            .acknowledgement_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    /// How many status writes were attempted, including failed ones.
    pub fn transition_calls(&self) -> usize {
        self.transition_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &FaceStore {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn snapshot(&self, scope: CandidateScope) -> Result<Vec<Record>, StoreError> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot failure injected".into()));
        }
        self.inner.snapshot(scope).await
    }

    async fn try_mark_found(&self, id: &str) -> Result<TransitionOutcome, StoreError> {
        self.transition_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .transition_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("status write failure injected".into()));
        }
        let outcome = self.inner.try_mark_found(id).await?;
        let delay = *self
            .acknowledgement_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(outcome)
    }

    async fn insert(&self, record: Record) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        RecordStore::get(&self.inner, id).await
    }

    async fn missing_persons(
        &self,
        status: Option<PersonStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.missing_persons(status).await
    }
}

/// Extractor that returns a fixed result regardless of the image.
pub struct StaticExtractor {
    result: Result<Embedding, ExtractError>,
}

impl StaticExtractor {
    pub fn returning(embedding: impl Into<Embedding>) -> Self {
        Self {
            result: Ok(embedding.into()),
        }
    }

    pub fn failing(err: ExtractError) -> Self {
        Self { result: Err(err) }
    }
}

#[async_trait]
impl EmbeddingExtractor for StaticExtractor {
    async fn extract(&self, _image: &[u8]) -> Result<Embedding, ExtractError> {
        self.result.clone()
    }
}
