//! Resolved runtime configuration for the CLI composition root.
//!
//! Parsing `coderag.json` itself and env-var interpolation are out of scope
//! for the engine's correctness contract — the core only ever consumes a
//! resolved [`Config`] value — but the struct and its defaults still need a
//! concrete, idiomatic home the way they would in the teacher's own crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// One entry in the multi-repo `repositories` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Which concrete collaborator to wire up for a capability the CLI
/// composition root needs to pick one of at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Mock,
    Ort,
    Anthropic,
    Duckdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub max_tokens_per_chunk: usize,
    pub embedding_dimensions: usize,
    pub hybrid_weight_vector: f32,
    pub hybrid_weight_bm25: f32,
    pub rerank_enabled: bool,
    pub rerank_top_n: usize,
    pub request_timeout_secs: u64,
    pub enrichment_batch_size: usize,
    pub worker_pool_size: usize,
    pub repositories: Vec<RepositoryConfig>,
    pub work_item_provider: Option<serde_json::Value>,
    pub llm_provider: ProviderKind,
    pub embedding_provider: ProviderKind,
    pub vector_store_provider: ProviderKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("~/.codesearch"),
            max_tokens_per_chunk: 2000,
            embedding_dimensions: 384,
            hybrid_weight_vector: 0.7,
            hybrid_weight_bm25: 0.3,
            rerank_enabled: false,
            rerank_top_n: 20,
            request_timeout_secs: 30,
            enrichment_batch_size: 16,
            worker_pool_size: 4,
            repositories: Vec::new(),
            work_item_provider: None,
            llm_provider: ProviderKind::Anthropic,
            embedding_provider: ProviderKind::Ort,
            vector_store_provider: ProviderKind::Duckdb,
        }
    }
}

impl Config {
    /// Loads `coderag.json` at `path`, falling back to [`Config::default`]
    /// when it doesn't exist. A malformed file is a fatal config error, not
    /// a silent fallback.
    pub fn load(path: &std::path::Path) -> Result<Self, DomainError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| DomainError::config(format!("invalid config at {}: {e}", path.display())))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.max_tokens_per_chunk, 2000);
        assert!((config.hybrid_weight_vector - 0.7).abs() < f32::EPSILON);
        assert!((config.hybrid_weight_bm25 - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = Config::load(std::path::Path::new("/nonexistent/coderag.json")).unwrap();
        assert_eq!(config.embedding_dimensions, 384);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("coderag.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, DomainError::Config(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("coderag.json");
        std::fs::write(
            &path,
            r#"{"repositories": [{"name": "a", "path": "/tmp/a"}], "max_tokens_per_chunk": 500}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].name, "a");
        assert_eq!(config.max_tokens_per_chunk, 500);
        assert_eq!(config.embedding_dimensions, 384, "unset fields keep their default");
    }
}
