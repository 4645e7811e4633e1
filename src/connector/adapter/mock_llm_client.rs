use async_trait::async_trait;

use crate::application::LlmClient;
use crate::domain::DomainError;

/// Deterministic, always-available stand-in for a real LLM backend, used in
/// tests and as the Enricher's default collaborator when no model server is
/// configured. Summaries are canned, not generated, so callers must not
/// assert on their exact wording — only that the pipeline completes.
pub struct MockLlmClient {
    canned_response: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            canned_response: "mock summary".to_string(),
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            canned_response: response.into(),
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, DomainError> {
        Ok(self.canned_response.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }
}
