//! Boundary to the external face-embedding model.
//!
//! Detection and landmarking happen outside this crate. An
//! [`EmbeddingExtractor`] turns image bytes into an [`Embedding`]; whatever it
//! returns is checked with [`validate_embedding`] before it reaches the matcher.

use async_trait::async_trait;
use store::Embedding;
use thiserror::Error;

/// Errors surfaced by an embedding extractor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("model produced a {found}-dimensional embedding, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("model produced an invalid embedding: {0}")]
    InvalidEmbedding(String),
}

/// Produces one face embedding per image.
#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractError>;
}

/// Reject embeddings the matcher could never use.
pub fn validate_embedding(
    embedding: &Embedding,
    expected_dimension: Option<usize>,
) -> Result<(), ExtractError> {
    if embedding.is_empty() {
        return Err(ExtractError::InvalidEmbedding("embedding is empty".into()));
    }
    if !embedding.is_finite() {
        return Err(ExtractError::InvalidEmbedding(
            "embedding contains non-finite values".into(),
        ));
    }
    if let Some(expected) = expected_dimension {
        if embedding.dimension() != expected {
            return Err(ExtractError::DimensionMismatch {
                expected,
                found: embedding.dimension(),
            });
        }
    }
    Ok(())
}
