use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Language};

/// One syntactic declaration carved out of a parsed file, with its nested
/// declarations (e.g. methods inside an `impl` block) attached as children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: String,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub children: Vec<Declaration>,
}

impl Declaration {
    pub fn new(
        kind: impl Into<String>,
        name: Option<String>,
        start_line: u32,
        end_line: u32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name,
            start_line,
            end_line,
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Declaration>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file_path: String,
    pub language: Language,
    pub root_declarations: Vec<Declaration>,
}

/// Parses source text into a declaration tree. Implementations skip files in
/// languages they don't know rather than returning a hard error — the
/// Scanner/Chunker turn `None` from [`Parser::parse`] into an
/// `UnsupportedFileType` diagnostic, never a fatal error.
#[async_trait]
pub trait Parser: Send + Sync {
    /// Returns `Ok(None)` for a recognized-but-unsupported language,
    /// `Err(DomainError::Parse { .. })` for a syntactic failure in a
    /// supported language, and `Ok(Some(..))` otherwise.
    async fn parse(
        &self,
        file_path: &str,
        content: &str,
    ) -> Result<Option<ParsedFile>, DomainError>;

    fn supported_languages(&self) -> Vec<Language>;

    fn supports_language(&self, language: Language) -> bool {
        self.supported_languages().contains(&language)
    }
}
