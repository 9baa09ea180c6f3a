use store::Record;
use tracing::debug;

use crate::distance::{is_incomparable, INCOMPARABLE};
use crate::types::{MatchError, MatchResult, MatcherConfig};


/// Counters collected during one linear scan. Diagnostic only; they never
/// influence the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Candidates handed to the scan.
    pub scanned: usize,
    /// Candidates a finite distance was computed for.
    pub eligible: usize,
    /// Candidates with an embedding that could not be compared to the query.
    pub incomparable: usize,
}

/// Nearest-neighbour identity matcher.
///
/// Pure: it reads the candidates it is handed and nothing else, so any number
/// of requests can share one `Matcher`.
#[derive(Debug, Clone)]
pub struct Matcher {
    cfg: MatcherConfig,
}

impl Matcher {
    pub fn new(cfg: MatcherConfig) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    pub fn threshold(&self) -> f32 {
        self.cfg.threshold
    }

    /// Reject queries no candidate could ever be compared against.
    pub fn validate_query(&self, query: &[f32]) -> Result<(), MatchError> {
        if query.is_empty() {
            return Err(MatchError::InvalidQuery("query embedding is empty".into()));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(MatchError::InvalidQuery(
                "query embedding contains non-finite values".into(),
            ));
        }
        if let Some(expected) = self.cfg.expected_dimension {
            if query.len() != expected {
                return Err(MatchError::InvalidQuery(format!(
                    "query has {} dimensions, expected {expected}",
                    query.len()
                )));
            }
        }
        Ok(())
    }

    /// Find the candidate nearest to `query` and decide whether it is close
    /// enough to count as a match.
    ///
    /// Candidates are visited in the order given and a later candidate only
    /// replaces the current best when it is strictly closer, so on a tie the
    /// earliest one wins. Candidates without an embedding, or with one of a
    /// different dimension, are skipped.
    pub fn find_best_match(
        &self,
        query: &[f32],
        candidates: &[Record],
    ) -> Result<MatchResult, MatchError> {
        self.scan(query, candidates).map(|(result, _)| result)
    }

    /// [`find_best_match`](Self::find_best_match) plus the scan counters.
    pub fn scan(
        &self,
        query: &[f32],
        candidates: &[Record],
    ) -> Result<(MatchResult, ScanStats), MatchError> {
        self.validate_query(query)?;

        let mut stats = ScanStats::default();
        let mut best: Option<&Record> = None;
        let mut best_distance = INCOMPARABLE;

        for candidate in candidates {
            stats.scanned += 1;
            let Some(embedding) = candidate.usable_embedding() else {
                continue;
            };
            if embedding.dimension() != query.len() {
                stats.incomparable += 1;
                debug!(
                    record_id = %candidate.id,
                    query_dimension = query.len(),
                    candidate_dimension = embedding.dimension(),
                    "candidate_incomparable"
                );
                continue;
            }

            let distance = self.cfg.metric.distance(query, embedding.as_slice());
            if is_incomparable(distance) {
                stats.incomparable += 1;
                continue;
            }
            stats.eligible += 1;
            if distance < best_distance {
                best_distance = distance;
                best = Some(candidate);
            }
        }

        let threshold = self.cfg.threshold;
        let result = match best {
            Some(record) if best_distance <= threshold => {
                MatchResult::matched(record.clone(), best_distance, threshold)
            }
            Some(_) => MatchResult::not_matched(best_distance, threshold),
            None => MatchResult::no_candidates(threshold),
        };
        Ok((result, stats))
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            cfg: MatcherConfig::default(),
        }
    }
}
