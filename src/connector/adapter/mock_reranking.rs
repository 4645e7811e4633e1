use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::application::RerankingService;
use crate::domain::{DomainError, SearchResult};

/// Deterministic, hash-seeded reranker standing in for a real LLM
/// cross-encoder in tests and offline demos. Scores every `(query, chunk)`
/// pair on the spec's 0-100 cross-encoder convention, then rescales to the
/// 0.0-1.0 float [`SearchResult`] scores use everywhere else.
pub struct MockReranking;

impl MockReranking {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic pseudo cross-encoder score in 0..=100.
    fn score_pair(query_hash: u64, content: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        query_hash.hash(&mut hasher);
        content.hash(&mut hasher);
        (hasher.finish() % 101) as u32
    }
}

impl Default for MockReranking {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RerankingService for MockReranking {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if results.is_empty() {
            return Ok(vec![]);
        }

        let query_hash = {
            let mut hasher = DefaultHasher::new();
            query.hash(&mut hasher);
            hasher.finish()
        };

        let mut reranked: Vec<SearchResult> = results
            .into_iter()
            .map(|result| {
                let score_0_100 = Self::score_pair(query_hash, result.chunk().content());
                let score = score_0_100 as f32 / 100.0;
                SearchResult::new(result.chunk().clone(), score, result.method())
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id().cmp(b.chunk_id()))
        });

        if let Some(k) = top_k {
            reranked.truncate(k);
        }

        Ok(reranked)
    }

    fn model_name(&self) -> &str {
        "mock-reranking"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkType, Language, SearchMethod};

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            "repo1".to_string(),
            format!("{id}.rs"),
            content.to_string(),
            1,
            1,
            Language::Rust,
            ChunkType::Function,
        )
    }

    #[tokio::test]
    async fn same_query_and_chunk_yield_same_score() {
        let service = MockReranking::new();
        let results = vec![SearchResult::new(
            chunk("a", "fn test() {}"),
            0.5,
            SearchMethod::Hybrid,
        )];

        let reranked1 = service
            .rerank("test query", results.clone(), None)
            .await
            .unwrap();
        let reranked2 = service.rerank("test query", results, None).await.unwrap();

        assert_eq!(reranked1[0].score(), reranked2[0].score());
    }

    #[tokio::test]
    async fn scores_stay_within_the_unit_interval() {
        let service = MockReranking::new();
        let results = vec![SearchResult::new(
            chunk("a", "fn test() {}"),
            0.5,
            SearchMethod::Hybrid,
        )];

        let reranked = service.rerank("query", results, None).await.unwrap();
        assert!(reranked[0].score() >= 0.0 && reranked[0].score() <= 1.0);
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let service = MockReranking::new();

        let results: Vec<SearchResult> = (0..10)
            .map(|i| {
                SearchResult::new(
                    chunk(&format!("test{i}"), &format!("fn test{i}() {{}}")),
                    0.5,
                    SearchMethod::Hybrid,
                )
            })
            .collect();

        let reranked = service.rerank("query", results, Some(5)).await.unwrap();

        assert_eq!(reranked.len(), 5);
    }
}
