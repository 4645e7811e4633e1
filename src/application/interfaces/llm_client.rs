use async_trait::async_trait;

use crate::domain::DomainError;

/// LLM collaborator used by the Enricher (to summarize chunks) and the
/// optional cross-encoder reranker (to score query/chunk pairs). A single
/// port covers both callers, the way the teacher's `ChatClient` trait covers
/// every prompt-response caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, DomainError>;

    /// Fast reachability probe, independent of `generate`'s own transport,
    /// used for the Enricher's mandatory preflight check before the first
    /// batch is dispatched.
    async fn is_available(&self) -> bool;
}
