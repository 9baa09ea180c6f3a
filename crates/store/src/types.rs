use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face embedding produced by the external model.
///
/// The buffer is shared, so cloning an `Embedding` into a snapshot never copies
/// the underlying floats. Once built it cannot be mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Arc<[f32]>);

impl Embedding {
    pub fn new(values: impl Into<Arc<[f32]>>) -> Self {
        Self(values.into())
    }

    /// An embedding with no dimensions. Records carrying one are stored but never
    /// eligible for matching.
    pub fn empty() -> Self {
        Self(Arc::from(Vec::<f32>::new()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when every component is a finite float (no NaN / infinity).
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values.into())
    }
}

impl From<&[f32]> for Embedding {
    fn from(values: &[f32]) -> Self {
        Self(values.into())
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Lifecycle state of a reported missing person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Missing,
    Found,
}

impl fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonStatus::Missing => f.write_str("missing"),
            PersonStatus::Found => f.write_str("found"),
        }
    }
}

/// What a record represents. Status only exists for missing persons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A registered user.
    User,
    /// A reported missing person and their current status.
    MissingPerson { status: PersonStatus },
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::MissingPerson { .. } => "missing_person",
        }
    }
}

/// A candidate identity as seen by the matching core.
///
/// Presentation fields (name, email, age, last seen location, photo) belong to
/// whatever layer owns the user-facing data; only what matching needs lives here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque identifier, unique within a store.
    pub id: String,
    pub kind: RecordKind,
    /// Face embedding; `None` or empty means the record is never matched against.
    #[serde(default)]
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: impl Into<String>, kind: RecordKind, embedding: Option<Embedding>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }

    /// A registered user with a face embedding.
    pub fn user(id: impl Into<String>, embedding: impl Into<Embedding>) -> Self {
        Self::new(id, RecordKind::User, Some(embedding.into()))
    }

    /// A freshly reported missing person; status starts at `Missing`.
    pub fn missing_person(id: impl Into<String>, embedding: impl Into<Embedding>) -> Self {
        Self::new(
            id,
            RecordKind::MissingPerson {
                status: PersonStatus::Missing,
            },
            Some(embedding.into()),
        )
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn status(&self) -> Option<PersonStatus> {
        match self.kind {
            RecordKind::User => None,
            RecordKind::MissingPerson { status } => Some(status),
        }
    }

    pub fn is_missing_person(&self) -> bool {
        matches!(self.kind, RecordKind::MissingPerson { .. })
    }

    /// The embedding if the record can take part in matching at all.
    pub fn usable_embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref().filter(|e| !e.is_empty())
    }
}

/// Which record kinds a match request considers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateScope {
    /// Users and missing persons.
    #[default]
    All,
    UsersOnly,
    MissingPersonsOnly,
}

impl CandidateScope {
    pub fn admits(&self, kind: &RecordKind) -> bool {
        match (self, kind) {
            (CandidateScope::All, _) => true,
            (CandidateScope::UsersOnly, RecordKind::User) => true,
            (CandidateScope::MissingPersonsOnly, RecordKind::MissingPerson { .. }) => true,
            _ => false,
        }
    }
}

/// Result of the conditional Missing → Found write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// This call flipped the status.
    Transitioned { at: DateTime<Utc> },
    /// Someone else already flipped it; nothing was written.
    AlreadyFound,
    /// The record is a user and has no status.
    NotMissingPerson,
    /// No record with that id exists.
    UnknownRecord,
}

impl TransitionOutcome {
    pub fn is_transitioned(&self) -> bool {
        matches!(self, TransitionOutcome::Transitioned { .. })
    }

    /// Status the record holds after the call, when it is a missing person.
    pub fn status_after(&self) -> Option<PersonStatus> {
        match self {
            TransitionOutcome::Transitioned { .. } | TransitionOutcome::AlreadyFound => {
                Some(PersonStatus::Found)
            }
            TransitionOutcome::NotMissingPerson | TransitionOutcome::UnknownRecord => None,
        }
    }
}
