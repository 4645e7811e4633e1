use async_trait::async_trait;

use crate::domain::{Chunk, DomainError};

/// One nearest-neighbor match: the opaque id, a distance or similarity score
/// (implementation-defined sign/scale — HybridSearch normalizes it), and the
/// chunk it was stored with.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub chunk: Chunk,
}

/// Conjunctive filters pushed down to the store's own query, mirroring
/// [`crate::domain::SearchFilters`] but expressed over the fields a store can
/// index directly.
#[derive(Debug, Clone, Default)]
pub struct VectorQueryFilters {
    pub languages: Option<Vec<String>>,
    pub chunk_types: Option<Vec<String>>,
    pub repository_ids: Option<Vec<String>>,
}

/// Persistent vector storage and similarity search, generalized over a
/// configurable embedding dimension `D` (fixed per store instance — a
/// dimension mismatch on `upsert` is a fatal configuration error, not a
/// recoverable one).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn connect(&self) -> Result<(), DomainError>;

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> Result<(), DomainError>;

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError>;

    /// Lexical fallback used by the hybrid-search fan-out when the store
    /// maintains its own keyword index (e.g. the teacher's LIKE-based
    /// scoring); stores without one may return an empty vector.
    async fn query_text(
        &self,
        terms: &[String],
        k: usize,
        filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError>;

    /// Resolves full chunks for ids the BM25 leg matched but the vector leg
    /// didn't surface, so hybrid search can materialize a `SearchResult` for
    /// every fused candidate. Ids with no stored chunk are silently omitted.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, DomainError>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), DomainError>;

    async fn delete_by_file_path(
        &self,
        repository_id: &str,
        file_path: &str,
    ) -> Result<u64, DomainError>;

    async fn delete_by_repository(&self, repository_id: &str) -> Result<(), DomainError>;

    /// Every stored row as `(id, vector, chunk)`, for copying a store's
    /// contents into another store (the root-merge recovery path) without
    /// re-embedding or re-enriching anything.
    async fn export_all(&self) -> Result<Vec<(String, Vec<f32>, Chunk)>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;

    async fn close(&self) -> Result<(), DomainError>;
}

/// Opens a namespaced [`VectorStore`] on demand. The multi-repo path needs
/// one store per repository plus a separate root-merged store (spec's "same
/// schema" root union), so the Orchestrator can't be handed a single
/// pre-built store the way the single-repo path can — it needs a way to mint
/// one per namespace without depending on a concrete connector adapter.
#[async_trait]
pub trait VectorStoreFactory: Send + Sync {
    async fn open(&self, namespace: &str) -> Result<std::sync::Arc<dyn VectorStore>, DomainError>;
}
