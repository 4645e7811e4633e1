use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::application::{EmbeddingProvider, RerankingService, VectorQueryFilters, VectorStore};
use crate::domain::{Chunk, DomainError, SearchFilters, SearchMethod, SearchResult};

const DEFAULT_WEIGHT_VECTOR: f32 = 0.7;
const DEFAULT_WEIGHT_BM25: f32 = 0.3;
const DEFAULT_RERANK_CANDIDATES: usize = 20;

/// Fusion weights for combining the vector and BM25 legs. `w_vector +
/// w_bm25` need not sum to exactly 1.0 but should by convention (spec
/// default 0.7/0.3).
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub w_vector: f32,
    pub w_bm25: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            w_vector: DEFAULT_WEIGHT_VECTOR,
            w_bm25: DEFAULT_WEIGHT_BM25,
        }
    }
}

/// Thin seam so the BM25 index (owned by the Orchestrator/IndexStore between
/// runs) can be handed to search without the use case owning storage
/// concerns directly.
pub trait Bm25Provider: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> Vec<(String, f32, Chunk)>;
}

pub struct HybridSearchUseCase {
    vector_store: Arc<dyn VectorStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    bm25: Arc<dyn Bm25Provider>,
    reranking_service: Option<Arc<dyn RerankingService>>,
    weights: FusionWeights,
}

impl HybridSearchUseCase {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        bm25: Arc<dyn Bm25Provider>,
    ) -> Self {
        Self {
            vector_store,
            embedding_provider,
            bm25,
            reranking_service: None,
            weights: FusionWeights::default(),
        }
    }

    pub fn with_reranking(mut self, service: Arc<dyn RerankingService>) -> Self {
        self.reranking_service = Some(service);
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        repo_name_lookup: impl Fn(&str) -> String,
    ) -> Result<Vec<SearchResult>, DomainError> {
        info!("Hybrid search for: {}", query);
        let start = Instant::now();

        let embeddings = self.embedding_provider.embed(&[query.to_string()]).await?;
        let query_vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embed("embedding provider returned no vector"))?;

        let fetch_limit = (top_k * 4).max(50);

        let vector_filters = VectorQueryFilters::default();
        let vector_matches = self
            .vector_store
            .query(&query_vector, fetch_limit, &vector_filters)
            .await?;
        let bm25_matches = self.bm25.search(query, fetch_limit);

        debug!(
            "hybrid: {} vector candidates, {} bm25 candidates",
            vector_matches.len(),
            bm25_matches.len()
        );

        let vector_max = vector_matches
            .iter()
            .map(|m| m.score)
            .fold(f32::MIN, f32::max)
            .max(f32::EPSILON);
        let bm25_max = bm25_matches
            .iter()
            .map(|(_, score, _)| *score)
            .fold(f32::MIN, f32::max)
            .max(f32::EPSILON);

        let mut combined: HashMap<String, (f32, Chunk)> = HashMap::new();

        for m in vector_matches {
            let normalized = (m.score / vector_max).clamp(0.0, 1.0);
            combined
                .entry(m.id.clone())
                .and_modify(|(score, _)| *score += self.weights.w_vector * normalized)
                .or_insert((self.weights.w_vector * normalized, m.chunk));
        }

        for (id, score, chunk) in bm25_matches {
            let normalized = (score / bm25_max).clamp(0.0, 1.0);
            combined
                .entry(id)
                .and_modify(|(s, _)| *s += self.weights.w_bm25 * normalized)
                .or_insert((self.weights.w_bm25 * normalized, chunk));
        }

        let mut results: Vec<SearchResult> = combined
            .into_iter()
            .filter(|(_, (_, chunk))| {
                let repo_name = repo_name_lookup(chunk.repository_id());
                filters.matches(chunk, &repo_name)
            })
            .map(|(_, (score, chunk))| SearchResult::new(chunk, score, SearchMethod::Hybrid))
            .collect();

        results.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id().cmp(b.chunk_id()))
        });
        results.truncate(top_k);

        if let Some(ref reranker) = self.reranking_service {
            results = self.rerank(query, results, reranker.as_ref()).await?;
        }

        let duration = start.elapsed();
        info!(
            "hybrid search found {} results in {:.2}s",
            results.len(),
            duration.as_secs_f64()
        );

        Ok(results)
    }

    /// Reranks the top `DEFAULT_RERANK_CANDIDATES` and prepends them ahead of
    /// the untouched remainder, per spec's "optional rerank" step. A network
    /// failure on the rerank call falls back to the pre-rerank ordering.
    async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        reranker: &dyn RerankingService,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if results.is_empty() {
            return Ok(results);
        }
        let split = results.len().min(DEFAULT_RERANK_CANDIDATES);
        let remainder = results.split_off(split);
        let top_k = split;
        let candidates = results.clone();

        match reranker.rerank(query, results, Some(top_k)).await {
            Ok(mut reranked) => {
                reranked.extend(remainder);
                Ok(reranked)
            }
            Err(err) => {
                warn!("rerank failed, falling back to pre-rerank order: {err}");
                let mut fallback = candidates;
                fallback.extend(remainder);
                Ok(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::VectorQueryFilters;
    use crate::domain::{ChunkType, Language};
    use async_trait::async_trait;

    fn make_chunk(id: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            "repo".to_string(),
            "src/lib.rs".to_string(),
            "fn x() {}".to_string(),
            1,
            1,
            Language::Rust,
            ChunkType::Function,
        )
    }

    #[test]
    fn fusion_weights_default_to_spec_values() {
        let weights = FusionWeights::default();
        assert!((weights.w_vector - 0.7).abs() < f32::EPSILON);
        assert!((weights.w_bm25 - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn chunk_survives_construction_for_fusion_map() {
        let chunk = make_chunk("repo:src/lib.rs:1:x");
        assert_eq!(chunk.id(), "repo:src/lib.rs:1:x");
    }

    struct StubVectorStore {
        matches: Vec<VectorMatch>,
    }

    #[async_trait]
    impl VectorStore for StubVectorStore {
        async fn connect(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn upsert(&self, _: &[String], _: &[Vec<f32>], _: &[Chunk]) -> Result<(), DomainError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _k: usize,
            _filters: &VectorQueryFilters,
        ) -> Result<Vec<VectorMatch>, DomainError> {
            Ok(self.matches.clone())
        }

        async fn query_text(
            &self,
            _terms: &[String],
            _k: usize,
            _filters: &VectorQueryFilters,
        ) -> Result<Vec<VectorMatch>, DomainError> {
            Ok(vec![])
        }

        async fn get_by_ids(&self, _ids: &[String]) -> Result<Vec<Chunk>, DomainError> {
            Ok(vec![])
        }

        async fn delete_by_ids(&self, _ids: &[String]) -> Result<(), DomainError> {
            Ok(())
        }

        async fn delete_by_file_path(&self, _repository_id: &str, _file_path: &str) -> Result<u64, DomainError> {
            Ok(0)
        }

        async fn delete_by_repository(&self, _repository_id: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn export_all(&self) -> Result<Vec<(String, Vec<f32>, Chunk)>, DomainError> {
            Ok(vec![])
        }

        async fn count(&self) -> Result<u64, DomainError> {
            Ok(self.matches.len() as u64)
        }

        async fn close(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    struct StubBm25 {
        hits: Vec<(String, f32, Chunk)>,
    }

    impl Bm25Provider for StubBm25 {
        fn search(&self, _query: &str, _limit: usize) -> Vec<(String, f32, Chunk)> {
            self.hits.clone()
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl RerankingService for FailingReranker {
        async fn rerank(
            &self,
            _query: &str,
            _results: Vec<SearchResult>,
            _top_k: Option<usize>,
        ) -> Result<Vec<SearchResult>, DomainError> {
            Err(DomainError::internal("reranker unavailable"))
        }

        fn model_name(&self) -> &str {
            "failing-reranker"
        }
    }

    fn use_case(vector_matches: Vec<VectorMatch>, bm25_hits: Vec<(String, f32, Chunk)>) -> HybridSearchUseCase {
        HybridSearchUseCase::new(
            Arc::new(StubVectorStore { matches: vector_matches }),
            Arc::new(StubEmbedding),
            Arc::new(StubBm25 { hits: bm25_hits }),
        )
    }

    #[tokio::test]
    async fn default_weights_combine_both_legs_for_a_shared_candidate() {
        // "a" scores top-of-leg on both sides, so each normalized contribution
        // is 1.0 and the fused score is exactly w_vector + w_bm25.
        let chunk_a = make_chunk("a");
        let search = use_case(
            vec![VectorMatch { id: "a".to_string(), score: 0.9, chunk: chunk_a.clone() }],
            vec![("a".to_string(), 5.0, chunk_a)],
        );

        let results = search
            .search("query", 10, &SearchFilters::new(), |id| id.to_string())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let expected = DEFAULT_WEIGHT_VECTOR + DEFAULT_WEIGHT_BM25;
        assert!((results[0].score() - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn candidate_missing_from_one_leg_contributes_zero_for_that_leg() {
        // "a" appears in both legs (normalized to 1.0 on each); "b" is
        // vector-only. "b"'s score must be exactly w_vector, i.e. the bm25
        // leg contributes 0 rather than polluting the sum.
        let chunk_a = make_chunk("a");
        let chunk_b = make_chunk("b");
        let search = use_case(
            vec![
                VectorMatch { id: "a".to_string(), score: 1.0, chunk: chunk_a.clone() },
                VectorMatch { id: "b".to_string(), score: 1.0, chunk: chunk_b },
            ],
            vec![("a".to_string(), 1.0, chunk_a)],
        );

        let results = search
            .search("query", 10, &SearchFilters::new(), |id| id.to_string())
            .await
            .unwrap();

        let b = results.iter().find(|r| r.chunk_id() == "b").unwrap();
        assert!((b.score() - DEFAULT_WEIGHT_VECTOR).abs() < 1e-6);

        let a = results.iter().find(|r| r.chunk_id() == "a").unwrap();
        assert!((a.score() - (DEFAULT_WEIGHT_VECTOR + DEFAULT_WEIGHT_BM25)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rerank_error_falls_back_to_pre_rerank_order() {
        let chunk_a = make_chunk("a");
        let chunk_b = make_chunk("b");
        let search = use_case(
            vec![
                VectorMatch { id: "a".to_string(), score: 1.0, chunk: chunk_a.clone() },
                VectorMatch { id: "b".to_string(), score: 0.5, chunk: chunk_b },
            ],
            vec![],
        )
        .with_reranking(Arc::new(FailingReranker));

        let results = search
            .search("query", 10, &SearchFilters::new(), |id| id.to_string())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id(), "a");
        assert_eq!(results[1].chunk_id(), "b");
    }
}
