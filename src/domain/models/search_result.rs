use serde::{Deserialize, Serialize};

use super::{Chunk, ChunkType, Language};

/// Which retrieval path produced a result, surfaced for observability and
/// test assertions — not consumed by ranking itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Vector,
    Bm25,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    chunk_id: String,
    chunk: Chunk,
    score: f32,
    method: SearchMethod,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32, method: SearchMethod) -> Self {
        Self {
            chunk_id: chunk.id().to_string(),
            chunk,
            score,
            method,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn method(&self) -> SearchMethod {
        self.method
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn is_relevant(&self, threshold: f32) -> bool {
        self.score >= threshold
    }

    pub fn display_line(&self) -> String {
        format!("{} (score: {:.3})", self.chunk.location(), self.score)
    }
}

/// Post-fusion filters applied before truncating to `topK` (spec HybridSearch
/// step 5). All fields are optional and conjunctive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub language: Option<Language>,
    pub chunk_type: Option<ChunkType>,
    pub file_path_glob: Option<String>,
    pub repo_name: Option<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = Some(chunk_type);
        self
    }

    pub fn with_file_path_glob(mut self, glob: impl Into<String>) -> Self {
        self.file_path_glob = Some(glob.into());
        self
    }

    pub fn with_repo_name(mut self, repo_name: impl Into<String>) -> Self {
        self.repo_name = Some(repo_name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.chunk_type.is_none()
            && self.file_path_glob.is_none()
            && self.repo_name.is_none()
    }

    /// Matches a chunk against every configured filter. The glob is a simple
    /// `*`-wildcard match (translated to a regex-free substring/prefix/suffix
    /// check), adequate for the `src/**/*.rs`-style patterns the CLI accepts.
    pub fn matches(&self, chunk: &Chunk, repo_name: &str) -> bool {
        if let Some(language) = self.language {
            if chunk.language() != language {
                return false;
            }
        }
        if let Some(chunk_type) = self.chunk_type {
            if chunk.chunk_type() != chunk_type {
                return false;
            }
        }
        if let Some(ref glob) = self.file_path_glob {
            if !glob_match(glob, chunk.file_path()) {
                return false;
            }
        }
        if let Some(ref name) = self.repo_name {
            if name != repo_name {
                return false;
            }
        }
        true
    }
}

/// Minimal `*` (any run of characters) glob matcher — no `?`/`[...]` support,
/// which the file-path filters in scope never need.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return text[pos..].ends_with(part);
        } else if let Some(found) = text[pos..].find(part) {
            pos += found + part.len();
        } else {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::chunk::Chunk;

    fn sample_chunk() -> Chunk {
        Chunk::new(
            "repo:test.rs:1:test".to_string(),
            "repo".to_string(),
            "src/test.rs".to_string(),
            "fn test() {}".to_string(),
            1,
            1,
            Language::Rust,
            ChunkType::Function,
        )
    }

    #[test]
    fn relevance_threshold() {
        let result = SearchResult::new(sample_chunk(), 0.95, SearchMethod::Hybrid);
        assert!(result.is_relevant(0.5));
        assert!(!result.is_relevant(0.99));
    }

    #[test]
    fn filters_match_language_and_glob() {
        let chunk = sample_chunk();
        let filters = SearchFilters::new()
            .with_language(Language::Rust)
            .with_file_path_glob("src/*.rs");
        assert!(filters.matches(&chunk, "repo"));

        let mismatched = SearchFilters::new().with_language(Language::Python);
        assert!(!mismatched.matches(&chunk, "repo"));
    }

    #[test]
    fn glob_prefix_and_suffix() {
        assert!(glob_match("src/*.rs", "src/test.rs"));
        assert!(!glob_match("src/*.rs", "lib/test.rs"));
        assert!(glob_match("*test*", "src/test.rs"));
    }
}
