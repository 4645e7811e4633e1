use async_trait::async_trait;

use crate::domain::{DomainError, EmbeddingConfig};

/// Generates dense vector embeddings from raw text. Callers (the Enricher's
/// output, or a query string) are responsible for building the text to embed
/// — this port only knows about strings, one vector per input, same order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    fn dimensions(&self) -> usize;

    fn config(&self) -> &EmbeddingConfig;
}
