use std::time::Duration;

use serde::{Deserialize, Serialize};
use store::{Record, StoreError, TransitionOutcome};
use thiserror::Error;

use crate::distance::{DistanceMetric, INCOMPARABLE};
use crate::extract::ExtractError;

/// Maximum distance at which a nearest candidate counts as the same person.
///
/// Calibrated for 128-dimensional face descriptors.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Upper bound on how long a single store call may take before the service
/// gives up on it.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Matching policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    /// Accept the nearest candidate when `distance <= threshold`.
    #[serde(default = "MatcherConfig::default_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// When set, queries of any other dimension are rejected up front.
    #[serde(default)]
    pub expected_dimension: Option<usize>,
}

impl MatcherConfig {
    pub(crate) fn default_threshold() -> f32 {
        DEFAULT_THRESHOLD
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "threshold must be a finite value >= 0.0, got {}",
                self.threshold
            )));
        }
        if self.expected_dimension == Some(0) {
            return Err(MatchError::InvalidConfig(
                "expected_dimension must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            metric: DistanceMetric::default(),
            expected_dimension: None,
        }
    }
}

/// Service-level knobs that sit outside the matching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Applied separately to the snapshot read and to the status write.
    pub store_timeout: Duration,
}

impl ServiceConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Outcome of one matching request.
///
/// `distance` is always the nearest comparable distance seen, even when it is
/// above the threshold; it is `+inf` when nothing was comparable. On the wire
/// `+inf` is written as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// The matched record as of the end of the request. For a missing person
    /// this reflects `Found` once the status transition went through.
    pub record: Option<Record>,
    #[serde(with = "nullable_distance")]
    pub distance: f32,
    /// Threshold the decision was made against.
    pub threshold: f32,
    /// `true` only for the request that performed the Missing -> Found write.
    #[serde(default)]
    pub transitioned: bool,
    /// Set when the match stood but the status write could not be made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_error: Option<String>,
}

impl MatchResult {
    /// Nothing comparable in the corpus.
    pub fn no_candidates(threshold: f32) -> Self {
        Self::not_matched(INCOMPARABLE, threshold)
    }

    pub fn not_matched(best_distance: f32, threshold: f32) -> Self {
        Self {
            matched: false,
            record: None,
            distance: best_distance,
            threshold,
            transitioned: false,
            transition_error: None,
        }
    }

    pub fn matched(record: Record, distance: f32, threshold: f32) -> Self {
        Self {
            matched: true,
            record: Some(record),
            distance,
            threshold,
            transitioned: false,
            transition_error: None,
        }
    }

    /// `1 - distance`, unclamped. Not a probability.
    pub fn confidence(&self) -> f32 {
        1.0 - self.distance
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.id.as_str())
    }
}

/// JSON has no infinity, so the no-candidate distance travels as `null`.
mod nullable_distance {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::distance::INCOMPARABLE;

    pub fn serialize<S: Serializer>(distance: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if distance.is_finite() {
            serializer.serialize_some(distance)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(INCOMPARABLE))
    }
}

/// Result of a status transition attempt that reached the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    /// `true` only when this call performed the write.
    pub transitioned: bool,
    pub outcome: TransitionOutcome,
}

impl From<TransitionOutcome> for Transition {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            transitioned: outcome.is_transitioned(),
            outcome,
        }
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Empty, non-finite or wrongly sized query embedding.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),
    /// A record offered for registration carries an unusable embedding.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// The candidate snapshot could not be read in time.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("embedding extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    /// Registration or listing failed in the store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The status write could not be confirmed. The match itself still stands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpdateUnavailableError {
    #[error("status update for `{record_id}` timed out after {timeout:?}")]
    Timeout { record_id: String, timeout: Duration },
    #[error("status update for `{record_id}` failed: {source}")]
    Store {
        record_id: String,
        #[source]
        source: StoreError,
    },
}

impl UpdateUnavailableError {
    pub fn record_id(&self) -> &str {
        match self {
            UpdateUnavailableError::Timeout { record_id, .. }
            | UpdateUnavailableError::Store { record_id, .. } => record_id,
        }
    }
}
