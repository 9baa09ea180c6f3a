//! # Face Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` decides whether a query face embedding belongs to a known
//! identity. It sits on top of the record store (`store`): every request takes
//! a point-in-time snapshot of the candidates, runs an exhaustive
//! nearest-neighbour scan, and accepts the nearest candidate when it lies
//! within a distance threshold. When the accepted candidate is a missing
//! person, the request also moves that person's status from `Missing` to
//! `Found`, and across any number of concurrent requests that write happens
//! at most once.
//!
//! ## Core Types
//!
//! - [`DistanceMetric`] / [`euclidean_distance`]: L2 distance with `+inf` for
//!   vectors of different length.
//! - [`MatcherConfig`]: threshold (default [`DEFAULT_THRESHOLD`]), metric and
//!   optional expected dimension.
//! - [`Matcher`]: the pure linear scan. Earliest candidate wins ties.
//! - [`StatusTransitionCoordinator`]: the conditional Missing -> Found write,
//!   bounded by a timeout.
//! - [`MatchService`]: request orchestration (snapshot, scan, transition).
//! - [`MatchResult`]: `matched`, the record, `distance`, `transitioned`, and
//!   `confidence()` (`1 - distance`, unclamped).
//! - [`EmbeddingExtractor`]: boundary to the external face-embedding model.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use matcher::MatchService;
//! use store::{FaceStore, Record, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FaceStore::new(StoreConfig::default())?);
//! let service = MatchService::with_defaults(store);
//!
//! service.register(Record::missing_person("mp-1", vec![0.1; 128])).await?;
//!
//! let result = service.match_embedding(&[0.1; 128]).await?;
//! if result.matched {
//!     println!(
//!         "matched {:?} distance={} confidence={} transitioned={}",
//!         result.record_id(),
//!         result.distance,
//!         result.confidence(),
//!         result.transitioned,
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Install a [`MatchMetrics`] implementation via [`set_match_metrics`] to record
//! per-request latency, scan sizes and status transition results.
//! [`FacadeMetrics`] forwards them to the `metrics` crate facade.

pub mod coordinator;
pub mod distance;
pub mod engine;
pub mod extract;
pub mod metrics;
pub mod service;
pub mod types;

#[doc(hidden)]
pub mod demo_utils;

pub use crate::coordinator::StatusTransitionCoordinator;
pub use crate::distance::{euclidean_distance, is_incomparable, DistanceMetric, INCOMPARABLE};
pub use crate::engine::{Matcher, ScanStats};
pub use crate::extract::{validate_embedding, EmbeddingExtractor, ExtractError};
pub use crate::metrics::{set_match_metrics, FacadeMetrics, MatchMetrics, TransitionReport};
pub use crate::service::MatchService;
pub use crate::types::{
    MatchError, MatchResult, MatcherConfig, ServiceConfig, Transition, UpdateUnavailableError,
    DEFAULT_STORE_TIMEOUT, DEFAULT_THRESHOLD,
};
