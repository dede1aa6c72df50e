use async_trait::async_trait;

use crate::domain::entities::point::Embeddings;
use crate::helper::error_chain_fmt;

/// Converts text to a fixed-length numeric vector.
///
/// Callers must not retry blindly on failure: embedding providers rate-limit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embeddings, EmbeddingError>;
}

/// Produces natural-language text given a prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(thiserror::Error)]
pub enum EmbeddingError {
    #[error("Failed to reach the embedding provider: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Embedding provider error: {0}")]
    Provider(String),
}

impl std::fmt::Debug for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(thiserror::Error)]
pub enum GenerationError {
    #[error("Failed to reach the generation provider: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Generation provider error: {0}")]
    Provider(String),
}

impl std::fmt::Debug for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
