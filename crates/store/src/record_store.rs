use async_trait::async_trait;

use crate::{CandidateScope, FaceStore, PersonStatus, Record, StoreError, TransitionOutcome};

/// The store as seen by the matching service.
///
/// Implementations must hand out snapshots that are copies, never live views,
/// and must implement [`try_mark_found`](RecordStore::try_mark_found) as a
/// single atomic conditional write.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point-in-time candidate records for one matching pass.
    async fn snapshot(&self, scope: CandidateScope) -> Result<Vec<Record>, StoreError>;

    /// Atomically transition `id` from `Missing` to `Found`.
    async fn try_mark_found(&self, id: &str) -> Result<TransitionOutcome, StoreError>;

    /// Register a new record.
    async fn insert(&self, record: Record) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Missing persons, newest first, optionally filtered by status.
    async fn missing_persons(
        &self,
        status: Option<PersonStatus>,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Backend calls block (locks, redb transactions), so they run on tokio's
/// blocking pool instead of an async worker.
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking store task failed: {e}")))?
}

#[async_trait]
impl RecordStore for FaceStore {
    async fn snapshot(&self, scope: CandidateScope) -> Result<Vec<Record>, StoreError> {
        let store = self.clone();
        run_blocking(move || store.load_snapshot(scope)).await
    }

    async fn try_mark_found(&self, id: &str) -> Result<TransitionOutcome, StoreError> {
        let store = self.clone();
        let id = id.to_string();
        run_blocking(move || store.mark_found(&id)).await
    }

    async fn insert(&self, record: Record) -> Result<(), StoreError> {
        let store = self.clone();
        run_blocking(move || store.insert_record(record)).await
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let store = self.clone();
        let id = id.to_string();
        run_blocking(move || store.get_record(&id)).await
    }

    async fn missing_persons(
        &self,
        status: Option<PersonStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        let store = self.clone();
        run_blocking(move || store.list_missing_persons(status)).await
    }
}
