use std::sync::Arc;

use tracing::{info, warn};

use crate::application::LlmClient;
use crate::domain::{Chunk, DomainError, EnrichmentCheckpoint};

const DEFAULT_BATCH_SIZE: usize = 100;
const CONSECUTIVE_FAILURE_LIMIT: u32 = 3;

fn summary_prompt(chunk: &Chunk) -> String {
    format!(
        "Summarize the following {} in one sentence, for use as a code search result description.\n\n{}",
        chunk.chunk_type(),
        chunk.content()
    )
}

pub struct EnricherUseCase {
    llm_client: Arc<dyn LlmClient>,
    model: String,
    batch_size: usize,
}

impl EnricherUseCase {
    pub fn new(llm_client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm_client,
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs the enrichment phase over `chunks`, resuming from `checkpoint`
    /// (chunks already present in `checkpoint.summaries()` are skipped).
    /// Mutates `checkpoint` in place via `on_batch_complete` so the caller
    /// can persist it atomically after every batch — the checkpoint write
    /// itself is the Orchestrator's responsibility (§4.C checkpoint
    /// discipline is a contract between this use case and its caller, not
    /// something this use case performs directly).
    pub async fn enrich(
        &self,
        chunks: &mut [Chunk],
        checkpoint: &mut EnrichmentCheckpoint,
        mut on_batch_complete: impl FnMut(&EnrichmentCheckpoint) -> Result<(), DomainError>,
    ) -> Result<(), DomainError> {
        if !self.llm_client.is_available().await {
            return Err(DomainError::internal(
                "llm enrichment preflight failed: endpoint unreachable",
            ));
        }

        let pending_indices: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !checkpoint.is_enriched(c.id()))
            .map(|(i, _)| i)
            .collect();

        info!(
            "enrichment: {} pending of {} total chunks",
            pending_indices.len(),
            chunks.len()
        );

        let mut consecutive_failures = 0u32;

        for batch_indices in pending_indices.chunks(self.batch_size) {
            let mut batch_had_success = false;

            for &idx in batch_indices {
                let chunk_id = chunks[idx].id().to_string();
                let prompt = summary_prompt(&chunks[idx]);

                match self.llm_client.generate(&prompt, &self.model).await {
                    Ok(summary) => {
                        let summary = summary.trim().to_string();
                        chunks[idx].set_nl_summary(summary.clone());
                        checkpoint.record(chunk_id, summary);
                        batch_had_success = true;
                    }
                    Err(err) => {
                        warn!("enrichment failed for chunk {chunk_id}: {err}");
                        checkpoint.record_failure();
                    }
                }
            }

            if batch_had_success {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }

            on_batch_complete(checkpoint)?;

            if consecutive_failures >= CONSECUTIVE_FAILURE_LIMIT {
                return Err(DomainError::internal(format!(
                    "enrichment aborted after {CONSECUTIVE_FAILURE_LIMIT} consecutive all-fail batches"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkType, Language};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockLlm {
        available: bool,
        fail_first_n: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn generate(&self, prompt: &str, _model: &str) -> Result<String, DomainError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let remaining = self.fail_first_n.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(DomainError::embed("transient failure"));
            }
            Ok("a concise summary".to_string())
        }

        async fn is_available(&self) -> bool {
            self.available
        }
    }

    fn make_chunk(id: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            "repo".to_string(),
            "a.rs".to_string(),
            "fn foo() {}".to_string(),
            1,
            1,
            Language::Rust,
            ChunkType::Function,
        )
    }

    #[tokio::test]
    async fn preflight_failure_is_fatal() {
        let llm = Arc::new(MockLlm {
            available: false,
            fail_first_n: AtomicUsize::new(0),
            calls: Mutex::new(vec![]),
        });
        let use_case = EnricherUseCase::new(llm, "test-model");
        let mut chunks = vec![make_chunk("a")];
        let mut checkpoint = EnrichmentCheckpoint::new();
        let result = use_case
            .enrich(&mut chunks, &mut checkpoint, |_| Ok(()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resumes_from_checkpoint() {
        let llm = Arc::new(MockLlm {
            available: true,
            fail_first_n: AtomicUsize::new(0),
            calls: Mutex::new(vec![]),
        });
        let use_case = EnricherUseCase::new(llm.clone(), "test-model");
        let mut chunks = vec![make_chunk("a"), make_chunk("b")];
        let mut checkpoint = EnrichmentCheckpoint::new();
        checkpoint.record("a".to_string(), "already done".to_string());

        use_case
            .enrich(&mut chunks, &mut checkpoint, |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(llm.calls.lock().unwrap().len(), 1);
        assert_eq!(checkpoint.total_processed(), 2);
    }

    #[tokio::test]
    async fn circuit_breaker_trips_after_three_failed_batches() {
        let llm = Arc::new(MockLlm {
            available: true,
            fail_first_n: AtomicUsize::new(100),
            calls: Mutex::new(vec![]),
        });
        let use_case = EnricherUseCase::new(llm, "test-model").with_batch_size(1);
        let mut chunks: Vec<Chunk> = (0..5).map(|i| make_chunk(&i.to_string())).collect();
        let mut checkpoint = EnrichmentCheckpoint::new();

        let result = use_case
            .enrich(&mut chunks, &mut checkpoint, |_| Ok(()))
            .await;
        assert!(result.is_err());
    }
}
