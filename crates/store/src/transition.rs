use chrono::Utc;
use tracing::{debug, info};

use crate::{FaceStore, PersonStatus, RecordKind, StoreError, TransitionOutcome, UpdateOutcome};

impl FaceStore {
    /// Set a missing person's status to `Found`, but only if it is currently
    /// `Missing`.
    ///
    /// The check and the write happen inside one backend `update`, so when
    /// several callers race on the same id exactly one of them gets
    /// [`TransitionOutcome::Transitioned`]; the rest see `AlreadyFound`.
    pub fn mark_found(&self, id: &str) -> Result<TransitionOutcome, StoreError> {
        let now = Utc::now();
        let mut outcome = TransitionOutcome::UnknownRecord;

        let write = self
            .backend
            .update(id, &mut |data: &[u8]| {
                let mut record = self.decode_record(data)?;
                match record.kind {
                    RecordKind::User => {
                        outcome = TransitionOutcome::NotMissingPerson;
                        Ok(None)
                    }
                    RecordKind::MissingPerson {
                        status: PersonStatus::Found,
                    } => {
                        outcome = TransitionOutcome::AlreadyFound;
                        Ok(None)
                    }
                    RecordKind::MissingPerson {
                        status: PersonStatus::Missing,
                    } => {
                        record.kind = RecordKind::MissingPerson {
                            status: PersonStatus::Found,
                        };
                        record.updated_at = now;
                        outcome = TransitionOutcome::Transitioned { at: now };
                        self.encode_record(&record).map(Some)
                    }
                }
            })?;

        let outcome = match write {
            UpdateOutcome::Missing => TransitionOutcome::UnknownRecord,
            UpdateOutcome::Unchanged | UpdateOutcome::Written => outcome,
        };

        match outcome {
            TransitionOutcome::Transitioned { .. } => {
                info!(record_id = %id, from = "missing", to = "found", "status_transitioned")
            }
            other => debug!(record_id = %id, outcome = ?other, "status_transition_skipped"),
        }
        Ok(outcome)
    }
}
