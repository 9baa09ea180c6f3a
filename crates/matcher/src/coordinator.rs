use std::sync::Arc;
use std::time::Duration;

use store::RecordStore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::types::{Transition, UpdateUnavailableError};

/// Performs the Missing -> Found write that follows a confirmed match.
///
/// The store's conditional write does the real work: when many requests match
/// the same missing person at once, exactly one of them sees
/// `transitioned == true`. This type adds the timeout and turns store failures
/// into [`UpdateUnavailableError`].
#[derive(Clone)]
pub struct StatusTransitionCoordinator {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl StatusTransitionCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Mark `record_id` as found if it is still missing.
    ///
    /// Returns `transitioned: false` when the record was already found, is
    /// not a missing person, or does not exist. On timeout the write may or may
    /// not have landed; calling again is safe.
    pub async fn try_mark_found(
        &self,
        record_id: &str,
    ) -> Result<Transition, UpdateUnavailableError> {
        let outcome = match timeout(self.timeout, self.store.try_mark_found(record_id)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(source)) => {
                warn!(record_id = %record_id, error = %source, "status_update_failed");
                return Err(UpdateUnavailableError::Store {
                    record_id: record_id.to_string(),
                    source,
                });
            }
            Err(_) => {
                warn!(
                    record_id = %record_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "status_update_timed_out"
                );
                return Err(UpdateUnavailableError::Timeout {
                    record_id: record_id.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let transition = Transition::from(outcome);
        info!(
            record_id = %record_id,
            transitioned = transition.transitioned,
            outcome = ?transition.outcome,
            "status_transition_attempted"
        );
        Ok(transition)
    }
}

impl std::fmt::Debug for StatusTransitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTransitionCoordinator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_utils::{in_memory_store, FlakyStore};
    use store::{PersonStatus, Record, TransitionOutcome};

    #[tokio::test]
    async fn first_call_transitions_second_does_not() {
        let store = in_memory_store(vec![Record::missing_person("mp", vec![0.1])]);
        let coordinator = StatusTransitionCoordinator::new(store.clone(), Duration::from_secs(1));

        let first = coordinator.try_mark_found("mp").await.unwrap();
        assert!(first.transitioned);
        let second = coordinator.try_mark_found("mp").await.unwrap();
        assert!(!second.transitioned);
        assert_eq!(second.outcome, TransitionOutcome::AlreadyFound);

        let rec = store.get("mp").await.unwrap().unwrap();
        assert_eq!(rec.status(), Some(PersonStatus::Found));
    }

    #[tokio::test]
    async fn unknown_record_is_not_an_error() {
        let store = in_memory_store(Vec::new());
        let coordinator = StatusTransitionCoordinator::new(store, Duration::from_secs(1));
        let t = coordinator.try_mark_found("ghost").await.unwrap();
        assert!(!t.transitioned);
        assert_eq!(t.outcome, TransitionOutcome::UnknownRecord);
    }

    #[tokio::test]
    async fn store_failure_is_update_unavailable() {
        let flaky = Arc::new(FlakyStore::new(vec![Record::missing_person("mp", vec![0.1])]));
        flaky.fail_transitions(true);
        let coordinator = StatusTransitionCoordinator::new(flaky.clone(), Duration::from_secs(1));

        let err = coordinator.try_mark_found("mp").await.unwrap_err();
        assert!(matches!(err, UpdateUnavailableError::Store { .. }));
        assert_eq!(err.record_id(), "mp");

        // Retrying after the store recovers succeeds.
        flaky.fail_transitions(false);
        assert!(coordinator.try_mark_found("mp").await.unwrap().transitioned);
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let flaky = Arc::new(FlakyStore::new(vec![Record::missing_person("mp", vec![0.1])]));
        flaky.delay_transitions(Some(Duration::from_secs(5)));
        let coordinator = StatusTransitionCoordinator::new(flaky, Duration::from_millis(20));

        let err = coordinator.try_mark_found("mp").await.unwrap_err();
        match err {
            UpdateUnavailableError::Timeout { timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(20))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
