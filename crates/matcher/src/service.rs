use std::sync::Arc;
use std::time::Instant;

use store::{CandidateScope, PersonStatus, Record, RecordKind, RecordStore, TransitionOutcome};
use tokio::time::timeout;
use tracing::{info, info_span, warn, Instrument};

use crate::coordinator::StatusTransitionCoordinator;
use crate::engine::{Matcher, ScanStats};
use crate::extract::{validate_embedding, EmbeddingExtractor};
use crate::metrics::{metrics_recorder, TransitionReport};
use crate::types::{
    MatchError, MatchResult, MatcherConfig, ServiceConfig, Transition, UpdateUnavailableError,
};

/// Request-level entry point: snapshot the store, scan it, and mark a matched
/// missing person as found.
///
/// A `MatchService` is `Send + Sync`; share one across tasks behind an `Arc`.
///
/// Every store call runs under `tokio::time::timeout`, so the service must be
/// driven by a runtime with timers enabled (`#[tokio::main]`, or a
/// `runtime::Builder` with `enable_time()` / `enable_all()`). Without them the
/// first request panics.
pub struct MatchService {
    matcher: Matcher,
    store: Arc<dyn RecordStore>,
    coordinator: StatusTransitionCoordinator,
    cfg: ServiceConfig,
}

impl MatchService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        matcher_cfg: MatcherConfig,
        cfg: ServiceConfig,
    ) -> Result<Self, MatchError> {
        let matcher = Matcher::new(matcher_cfg)?;
        let coordinator = StatusTransitionCoordinator::new(store.clone(), cfg.store_timeout);
        Ok(Self {
            matcher,
            store,
            coordinator,
            cfg,
        })
    }

    /// Default matcher policy and timeouts over `store`.
    pub fn with_defaults(store: Arc<dyn RecordStore>) -> Self {
        let cfg = ServiceConfig::default();
        Self {
            matcher: Matcher::default(),
            coordinator: StatusTransitionCoordinator::new(store.clone(), cfg.store_timeout),
            store,
            cfg,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Match `query` against every user and every missing person.
    pub async fn match_embedding(&self, query: &[f32]) -> Result<MatchResult, MatchError> {
        self.match_embedding_in(query, CandidateScope::All).await
    }

    /// Match `query` against the records `scope` admits.
    ///
    /// When the nearest record is a missing person within threshold, its status
    /// is moved to `Found` before returning and the returned record reflects
    /// that. If the status write cannot be confirmed the match still stands:
    /// `transition_error` is set and the write can be retried with
    /// [`retry_transition`](Self::retry_transition).
    pub async fn match_embedding_in(
        &self,
        query: &[f32],
        scope: CandidateScope,
    ) -> Result<MatchResult, MatchError> {
        if let Err(err) = self.matcher.validate_query(query) {
            warn!(error = %err, dimension = query.len(), "match_rejected");
            return Err(err);
        }

        let span = info_span!("facematch.match", scope = ?scope, dimension = query.len());
        self.run_match(query, scope).instrument(span).await
    }

    async fn run_match(
        &self,
        query: &[f32],
        scope: CandidateScope,
    ) -> Result<MatchResult, MatchError> {
        let start = Instant::now();

        let candidates = match timeout(self.cfg.store_timeout, self.store.snapshot(scope)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(err)) => {
                warn!(error = %err, "snapshot_failed");
                return Err(MatchError::StoreUnavailable(err.to_string()));
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.cfg.store_timeout.as_millis() as u64,
                    "snapshot_timed_out"
                );
                return Err(MatchError::StoreUnavailable(format!(
                    "snapshot timed out after {:?}",
                    self.cfg.store_timeout
                )));
            }
        };

        let (mut result, stats) = self.matcher.scan(query, &candidates)?;
        drop(candidates);

        if let Some(record) = result.record.as_mut().filter(|r| r.is_missing_person()) {
            let attempt = self.coordinator.try_mark_found(&record.id).await;
            report_transition(&attempt);
            match attempt {
                Ok(transition) => {
                    result.transitioned = transition.transitioned;
                    reflect_transition(record, &transition);
                }
                Err(err) => result.transition_error = Some(err.to_string()),
            }
        }

        self.report(&result, &stats, start);
        Ok(result)
    }

    /// Extract an embedding from `image` and match it.
    pub async fn match_image(
        &self,
        extractor: &dyn EmbeddingExtractor,
        image: &[u8],
    ) -> Result<MatchResult, MatchError> {
        let embedding = match extractor.extract(image).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, image_bytes = image.len(), "extraction_failed");
                return Err(err.into());
            }
        };
        validate_embedding(&embedding, self.matcher.config().expected_dimension)?;
        self.match_embedding(embedding.as_slice()).await
    }

    /// Add a user or missing person to the store.
    ///
    /// A record may be registered without an embedding; it is kept but never
    /// matched against. New missing persons must start out `Missing`.
    pub async fn register(&self, record: Record) -> Result<(), MatchError> {
        if let Some(embedding) = record.usable_embedding() {
            validate_embedding(embedding, self.matcher.config().expected_dimension)
                .map_err(|e| MatchError::InvalidRecord(format!("{}: {e}", record.id)))?;
        }
        if record.status() == Some(PersonStatus::Found) {
            return Err(MatchError::InvalidRecord(format!(
                "{}: missing persons must be registered as missing",
                record.id
            )));
        }

        let id = record.id.clone();
        let kind = record.kind.label();
        let has_embedding = record.usable_embedding().is_some();
        match timeout(self.cfg.store_timeout, self.store.insert(record)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MatchError::StoreUnavailable(format!(
                    "insert timed out after {:?}",
                    self.cfg.store_timeout
                )))
            }
        }
        info!(record_id = %id, kind, has_embedding, "record_registered");
        Ok(())
    }

    /// Missing persons, newest first, optionally filtered by status.
    pub async fn missing_persons(
        &self,
        status: Option<PersonStatus>,
    ) -> Result<Vec<Record>, MatchError> {
        match timeout(self.cfg.store_timeout, self.store.missing_persons(status)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MatchError::StoreUnavailable(format!(
                "listing timed out after {:?}",
                self.cfg.store_timeout
            ))),
        }
    }

    /// Re-attempt the status write for a match whose `transition_error` was set.
    pub async fn retry_transition(
        &self,
        record_id: &str,
    ) -> Result<Transition, UpdateUnavailableError> {
        let transition = self.coordinator.try_mark_found(record_id).await;
        report_transition(&transition);
        transition
    }

    /// Look up one record by id, e.g. to show a missing person's details.
    pub async fn get(&self, record_id: &str) -> Result<Option<Record>, MatchError> {
        match timeout(self.cfg.store_timeout, self.store.get(record_id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MatchError::StoreUnavailable(format!(
                "lookup of `{record_id}` timed out after {:?}",
                self.cfg.store_timeout
            ))),
        }
    }

    fn report(&self, result: &MatchResult, stats: &ScanStats, start: Instant) {
        let latency = start.elapsed();
        info!(
            matched = result.matched,
            record_id = result.record_id().unwrap_or(""),
            distance = result.distance,
            transitioned = result.transitioned,
            transition_failed = result.transition_error.is_some(),
            scanned = stats.scanned,
            eligible = stats.eligible,
            incomparable = stats.incomparable,
            elapsed_micros = latency.as_micros() as u64,
            "match_completed"
        );
        if let Some(recorder) = metrics_recorder() {
            recorder.record_match(result.matched, latency, stats.eligible, stats.incomparable);
        }
    }
}

fn report_transition(attempt: &Result<Transition, UpdateUnavailableError>) {
    if let Some(recorder) = metrics_recorder() {
        recorder.record_transition(TransitionReport::for_attempt(attempt));
    }
}

/// Bring a snapshot copy in line with what the store now holds.
fn reflect_transition(record: &mut Record, transition: &Transition) {
    if let Some(status) = transition.outcome.status_after() {
        record.kind = RecordKind::MissingPerson { status };
    }
    if let TransitionOutcome::Transitioned { at } = transition.outcome {
        record.updated_at = at;
    }
}

impl std::fmt::Debug for MatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchService")
            .field("matcher", &self.matcher)
            .field("coordinator", &self.coordinator)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_utils::{axis_vector, in_memory_store, FlakyStore, StaticExtractor};
    use crate::extract::ExtractError;
    use std::time::Duration;

    fn scenario_records() -> Vec<Record> {
        vec![
            Record::user("u1", axis_vector(128, 0, 0.3)),
            Record::missing_person("mp1", axis_vector(128, 1, 1.0)),
        ]
    }

    #[tokio::test]
    async fn user_match_has_no_side_effect() {
        let flaky = Arc::new(FlakyStore::new(scenario_records()));
        let service = MatchService::with_defaults(flaky.clone());

        let result = service.match_embedding(&[0.0; 128]).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.record_id(), Some("u1"));
        assert!(!result.transitioned);
        assert!((result.confidence() - 0.7).abs() < 1e-6);
        assert_eq!(flaky.transition_calls(), 0);
    }

    #[tokio::test]
    async fn missing_person_match_is_marked_found() {
        let store = in_memory_store(vec![
            Record::user("u1", axis_vector(128, 0, 2.0)),
            Record::missing_person("mp1", axis_vector(128, 1, 0.5)),
        ]);
        let service = MatchService::with_defaults(store.clone());

        let result = service.match_embedding(&[0.0; 128]).await.unwrap();
        assert!(result.matched);
        assert!(result.transitioned);
        let record = result.record.unwrap();
        assert_eq!(record.id, "mp1");
        assert_eq!(record.status(), Some(PersonStatus::Found));
        assert!((result.distance - 0.5).abs() < 1e-6);

        let stored = store.get_record("mp1").unwrap().unwrap();
        assert_eq!(stored.status(), Some(PersonStatus::Found));
    }

    #[tokio::test]
    async fn no_match_above_threshold() {
        let store = in_memory_store(vec![Record::user("u1", axis_vector(128, 0, 0.9))]);
        let service = MatchService::with_defaults(store);
        let result = service.match_embedding(&[0.0; 128]).await.unwrap();
        assert!(!result.matched);
        assert!(result.record.is_none());
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failed_status_write_keeps_the_match() {
        let flaky = Arc::new(FlakyStore::new(vec![Record::missing_person(
            "mp1",
            vec![0.1, 0.1],
        )]));
        flaky.fail_transitions(true);
        let service = MatchService::with_defaults(flaky.clone());

        let result = service.match_embedding(&[0.1, 0.1]).await.unwrap();
        assert!(result.matched);
        assert!(!result.transitioned);
        assert!(result.transition_error.is_some());
        assert_eq!(
            result.record.as_ref().unwrap().status(),
            Some(PersonStatus::Missing)
        );

        flaky.fail_transitions(false);
        let retried = service.retry_transition("mp1").await.unwrap();
        assert!(retried.transitioned);
        assert_eq!(flaky.transition_calls(), 2);
    }

    #[tokio::test]
    async fn stalled_status_write_times_out() {
        let flaky = Arc::new(FlakyStore::new(vec![Record::missing_person("mp1", vec![0.2])]));
        flaky.delay_transitions(Some(Duration::from_secs(5)));
        let service = MatchService::new(
            flaky,
            MatcherConfig::default(),
            ServiceConfig::default().with_store_timeout(Duration::from_millis(200)),
        )
        .unwrap();

        let result = service.match_embedding(&[0.2]).await.unwrap();
        assert!(result.matched);
        let err = result.transition_error.unwrap();
        assert!(err.contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn snapshot_failure_is_store_unavailable() {
        let flaky = Arc::new(FlakyStore::new(scenario_records()));
        flaky.fail_snapshots(true);
        let service = MatchService::with_defaults(flaky);
        let err = service.match_embedding(&[0.0; 128]).await.unwrap_err();
        assert!(matches!(err, MatchError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_query_rejected_before_reading_store() {
        let flaky = Arc::new(FlakyStore::new(scenario_records()));
        flaky.fail_snapshots(true);
        let service = MatchService::with_defaults(flaky);
        let err = service.match_embedding(&[]).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn users_only_scope_ignores_missing_persons() {
        let store = in_memory_store(vec![
            Record::user("u1", vec![0.5]),
            Record::missing_person("mp1", vec![0.0]),
        ]);
        let service = MatchService::with_defaults(store.clone());
        let result = service
            .match_embedding_in(&[0.0], CandidateScope::UsersOnly)
            .await
            .unwrap();
        assert_eq!(result.record_id(), Some("u1"));
        assert_eq!(
            store.get_record("mp1").unwrap().unwrap().status(),
            Some(PersonStatus::Missing)
        );
    }

    #[tokio::test]
    async fn image_matching_goes_through_the_extractor() {
        let store = in_memory_store(vec![Record::missing_person("mp1", vec![0.1, 0.2])]);
        let service = MatchService::with_defaults(store);

        let hit = service
            .match_image(&StaticExtractor::returning(vec![0.1, 0.2]), b"jpeg")
            .await
            .unwrap();
        assert!(hit.transitioned);

        let err = service
            .match_image(&StaticExtractor::failing(ExtractError::NoFaceDetected), b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Extraction(ExtractError::NoFaceDetected)));

        let err = service
            .match_image(&StaticExtractor::returning(Vec::<f32>::new()), b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::Extraction(ExtractError::InvalidEmbedding(_))
        ));
    }

    #[test]
    fn serves_requests_on_a_hand_built_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let service = MatchService::with_defaults(in_memory_store(scenario_records()));
        let result = runtime
            .block_on(service.match_embedding_in(&[0.0; 128], CandidateScope::UsersOnly))
            .unwrap();
        assert_eq!(result.record_id(), Some("u1"));
    }

    #[tokio::test]
    async fn get_returns_registered_records() {
        let service = MatchService::with_defaults(in_memory_store(Vec::new()));
        service
            .register(Record::missing_person("mp1", vec![0.4, 0.1]))
            .await
            .unwrap();

        let record = service.get("mp1").await.unwrap().unwrap();
        assert_eq!(record.status(), Some(PersonStatus::Missing));
        assert!(service.get("nobody").await.unwrap().is_none());

        service.match_embedding(&[0.4, 0.1]).await.unwrap();
        let record = service.get("mp1").await.unwrap().unwrap();
        assert_eq!(record.status(), Some(PersonStatus::Found));
    }

    #[tokio::test]
    async fn register_validates_and_lists() {
        let store = in_memory_store(Vec::new());
        let service = MatchService::new(
            store,
            MatcherConfig::default().with_expected_dimension(2),
            ServiceConfig::default(),
        )
        .unwrap();

        service
            .register(Record::missing_person("mp1", vec![0.1, 0.2]))
            .await
            .unwrap();
        service
            .register(Record::new(
                "mp2",
                RecordKind::MissingPerson {
                    status: PersonStatus::Missing,
                },
                None,
            ))
            .await
            .unwrap();

        let err = service
            .register(Record::user("u-bad", vec![0.1, 0.2, 0.3]))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidRecord(_)));

        let err = service
            .register(Record::missing_person("mp1", vec![0.3, 0.4]))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Store(store::StoreError::DuplicateId(_))));

        let listed = service.missing_persons(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        let found = service
            .missing_persons(Some(PersonStatus::Found))
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
