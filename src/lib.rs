//! Workspace umbrella crate for facematch.
//!
//! This crate stitches the record store and the matcher together so callers
//! can go from a YAML file to a running [`MatchService`] with a single call.

pub mod config;

pub use config::{
    ConfigLoadError, FaceMatchConfig, MatcherYamlConfig, ServiceYamlConfig, StoreYamlConfig,
};
pub use matcher::{
    DEFAULT_STORE_TIMEOUT, DEFAULT_THRESHOLD, DistanceMetric, EmbeddingExtractor, ExtractError,
    FacadeMetrics, MatchError, MatchMetrics, MatchResult, MatchService, Matcher, MatcherConfig,
    ServiceConfig, StatusTransitionCoordinator, Transition, UpdateUnavailableError,
    euclidean_distance, set_match_metrics,
};
pub use store::{
    BackendConfig, CandidateScope, CompressionCodec, CompressionConfig, Embedding, FaceStore,
    PersonStatus, Record, RecordKind, RecordStore, StoreConfig, StoreError, TransitionOutcome,
};

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

/// Errors that can occur while wiring a service from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),
    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),
    #[error("invalid matcher settings: {0}")]
    Match(#[from] MatchError),
}

/// Open the record store described by `cfg`.
pub fn open_store(cfg: &FaceMatchConfig) -> Result<Arc<FaceStore>, SetupError> {
    let store_cfg = cfg.store_config();
    let store = FaceStore::new(store_cfg)?;
    info!(
        backend = %cfg.store.backend,
        compression = %cfg.store.compression,
        include_found = cfg.store.include_found,
        "record_store_opened"
    );
    Ok(Arc::new(store))
}

/// Build a [`MatchService`] over `store` using the matcher and service
/// sections of `cfg`.
pub fn build_service_with_store(
    cfg: &FaceMatchConfig,
    store: Arc<dyn RecordStore>,
) -> Result<MatchService, SetupError> {
    let service = MatchService::new(store, cfg.matcher_config(), cfg.service_config())?;
    info!(
        threshold = cfg.matcher.threshold,
        expected_dimension = ?cfg.matcher.expected_dimension,
        store_timeout_ms = cfg.service.store_timeout_ms,
        "match_service_ready"
    );
    Ok(service)
}

/// Open the configured store and build a [`MatchService`] over it.
pub fn build_service(cfg: &FaceMatchConfig) -> Result<MatchService, SetupError> {
    let store = open_store(cfg)?;
    build_service_with_store(cfg, store)
}

/// Load a YAML file, apply `FACEMATCH_*` environment overrides and build the
/// service it describes.
pub fn service_from_file<P: AsRef<Path>>(path: P) -> Result<MatchService, SetupError> {
    let mut cfg = FaceMatchConfig::from_file(path)?;
    cfg.apply_env_overrides()?;
    build_service(&cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_service() {
        let service = build_service(&FaceMatchConfig::default()).unwrap();
        assert_eq!(service.matcher().threshold(), DEFAULT_THRESHOLD);

        service
            .register(Record::user("u1", vec![0.1, 0.2]))
            .await
            .unwrap();
        let result = service.match_embedding(&[0.1, 0.2]).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.record_id(), Some("u1"));
    }

    #[test]
    fn invalid_matcher_settings_surface_as_setup_error() {
        let mut cfg = FaceMatchConfig::default();
        cfg.matcher.threshold = -1.0;
        let err = build_service(&cfg).unwrap_err();
        assert!(matches!(err, SetupError::Match(MatchError::InvalidConfig(_))));
    }
}
