use async_trait::async_trait;
use tracing::warn;

use crate::application::{LlmClient, RerankingService};
use crate::domain::{DomainError, SearchResult};

use std::sync::Arc;

/// Score assigned to a pair when the LLM's response can't be parsed as an
/// integer, and to every pair after the first once per-item calls start
/// failing. Neutral rather than zero, so a run of transient failures doesn't
/// bury otherwise-relevant results at the bottom of the rerank window.
const NEUTRAL_SCORE: u32 = 50;

fn rating_prompt(query: &str, result: &SearchResult) -> String {
    let chunk = result.chunk();
    format!(
        "Rate how relevant the following code is to the search query, on a scale from 0 (irrelevant) to 100 (exact match). Respond with only the integer score, nothing else.\n\nQuery: {query}\n\nCode ({}):\n{}",
        chunk.chunk_type(),
        chunk.content()
    )
}

/// Extracts the first run of ASCII digits in `text` and clamps it to
/// `[0, 100]`. Returns `None` if the response contains no digits at all.
fn parse_score(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().map(|n| n.min(100))
}

/// Reranks by asking an [`LlmClient`] to score each `(query, chunk)` pair
/// 0-100, one request per pair. Non-parseable responses and per-item HTTP
/// errors after the first both degrade to [`NEUTRAL_SCORE`] rather than
/// failing the whole call; a failure on the very first pair is treated as a
/// systemic outage and propagated so the caller falls back to the pre-rerank
/// ordering.
pub struct LlmReranking {
    llm_client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmReranking {
    pub fn new(llm_client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm_client,
            model: model.into(),
        }
    }

    async fn score(&self, query: &str, result: &SearchResult, is_first: bool) -> Result<u32, DomainError> {
        let prompt = rating_prompt(query, result);
        match self.llm_client.generate(&prompt, &self.model).await {
            Ok(text) => Ok(parse_score(&text).unwrap_or_else(|| {
                warn!("reranker: non-parseable LLM response for {}", result.chunk_id());
                NEUTRAL_SCORE
            })),
            Err(err) if is_first => Err(err),
            Err(err) => {
                warn!("reranker: transient failure scoring {}: {err}", result.chunk_id());
                Ok(NEUTRAL_SCORE)
            }
        }
    }
}

#[async_trait]
impl RerankingService for LlmReranking {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if results.is_empty() {
            return Ok(vec![]);
        }

        let mut scored = Vec::with_capacity(results.len());
        for (i, result) in results.into_iter().enumerate() {
            let score_0_100 = self.score(query, &result, i == 0).await?;
            let score = score_0_100 as f32 / 100.0;
            scored.push(SearchResult::new(result.chunk().clone(), score, result.method()));
        }

        scored.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id().cmp(b.chunk_id()))
        });

        if let Some(k) = top_k {
            scored.truncate(k);
        }

        Ok(scored)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
