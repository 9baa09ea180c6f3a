// Metrics hooks for the `matcher` crate.
//
// Callers install a global `MatchMetrics` implementation via [`set_match_metrics`],
// then `MatchService` reports per-request latency, scan sizes and status
// transition results. `FacadeMetrics` forwards everything to the `metrics`
// facade so any exporter installed by the host process picks it up.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;
use store::TransitionOutcome;

use crate::types::{Transition, UpdateUnavailableError};

/// What happened to the status write that follows a missing-person match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReport {
    /// This request flipped Missing -> Found.
    Transitioned,
    /// The record was already found; nothing written.
    AlreadyFound,
    /// The id now belongs to a user record.
    NotMissingPerson,
    /// The record vanished between the snapshot and the write.
    UnknownRecord,
    /// The write timed out or the store failed.
    Unavailable,
}

impl TransitionReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReport::Transitioned => "transitioned",
            TransitionReport::AlreadyFound => "already_found",
            TransitionReport::NotMissingPerson => "not_missing_person",
            TransitionReport::UnknownRecord => "unknown_record",
            TransitionReport::Unavailable => "unavailable",
        }
    }

    pub(crate) fn for_attempt(attempt: &Result<Transition, UpdateUnavailableError>) -> Self {
        match attempt {
            Ok(transition) => Self::from(&transition.outcome),
            Err(_) => TransitionReport::Unavailable,
        }
    }
}

impl From<&TransitionOutcome> for TransitionReport {
    fn from(outcome: &TransitionOutcome) -> Self {
        match outcome {
            TransitionOutcome::Transitioned { .. } => TransitionReport::Transitioned,
            TransitionOutcome::AlreadyFound => TransitionReport::AlreadyFound,
            TransitionOutcome::NotMissingPerson => TransitionReport::NotMissingPerson,
            TransitionOutcome::UnknownRecord => TransitionReport::UnknownRecord,
        }
    }
}

/// Metrics observer for match operations.
pub trait MatchMetrics: Send + Sync {
    /// Record the outcome of a match.
    ///
    /// `latency` covers snapshot, scan and any status write. `eligible` is the
    /// number of candidates a distance was computed for and `incomparable` the
    /// number skipped for a dimension mismatch.
    fn record_match(&self, matched: bool, latency: Duration, eligible: usize, incomparable: usize);

    fn record_transition(&self, report: TransitionReport);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global match metrics recorder.
///
/// This is typically called once during service startup so every
/// `MatchService` shares the same metrics backend.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

/// [`MatchMetrics`] backed by the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetrics;

impl MatchMetrics for FacadeMetrics {
    fn record_match(&self, matched: bool, latency: Duration, eligible: usize, incomparable: usize) {
        let outcome = if matched { "matched" } else { "no_match" };
        ::metrics::counter!("facematch_requests_total", "outcome" => outcome).increment(1);
        ::metrics::histogram!("facematch_match_latency_seconds").record(latency.as_secs_f64());
        ::metrics::histogram!("facematch_candidates_scanned").record(eligible as f64);
        if incomparable > 0 {
            ::metrics::counter!("facematch_incomparable_candidates_total")
                .increment(incomparable as u64);
        }
    }

    fn record_transition(&self, report: TransitionReport) {
        ::metrics::counter!("facematch_status_transitions_total", "result" => report.as_str())
            .increment(1);
    }
}
