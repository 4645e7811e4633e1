use serde::{Deserialize, Serialize};

use super::Language;

/// The kind of declaration a chunk was carved out of. `Doc` covers Markdown
/// heading sections produced by the doc-mode chunking path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Impl,
    Module,
    Constant,
    TypeDef,
    Interface,
    Block,
    Doc,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Method => "method",
            ChunkType::Class => "class",
            ChunkType::Struct => "struct",
            ChunkType::Enum => "enum",
            ChunkType::Trait => "trait",
            ChunkType::Impl => "impl",
            ChunkType::Module => "module",
            ChunkType::Constant => "constant",
            ChunkType::TypeDef => "type_def",
            ChunkType::Interface => "interface",
            ChunkType::Block => "block",
            ChunkType::Doc => "doc",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ChunkType::Function | ChunkType::Method)
    }

    pub fn is_type_definition(&self) -> bool {
        matches!(
            self,
            ChunkType::Class
                | ChunkType::Struct
                | ChunkType::Enum
                | ChunkType::Trait
                | ChunkType::TypeDef
                | ChunkType::Interface
        )
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata the Enricher fills in after the Chunker has produced the raw
/// chunk. `nl_summary` and `keywords` start empty and are populated (or left
/// empty, per the degraded-mode invariant) by the enrichment pass.
///
/// `repo_name` is set only for multi-repo indices (absent for single-repo),
/// `declarations` holds the names of the declarations nested directly inside
/// this chunk (e.g. a class chunk's method names), and `doc_title` is the
/// enclosing Markdown heading for doc-mode chunks. `exports` and `tags` are
/// part of the data model but nothing in this crate currently has a source
/// of export/visibility or tag data to populate them from, so they stay
/// empty like `keywords`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub nl_summary: Option<String>,
    pub keywords: Vec<String>,
    pub imports: Vec<String>,
    pub declarations: Vec<String>,
    pub exports: Vec<String>,
    pub tags: Vec<String>,
    pub doc_title: Option<String>,
    pub repo_name: Option<String>,
}

/// A unit of retrievable code or documentation. `id` is stable across
/// incremental re-indexing runs (derived from file path + symbol path, not
/// from file-order position) so that vector-store upserts replace rather
/// than duplicate entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    id: String,
    repository_id: String,
    file_path: String,
    content: String,
    start_line: u32,
    end_line: u32,
    language: Language,
    chunk_type: ChunkType,
    symbol_name: Option<String>,
    parent_symbol: Option<String>,
    metadata: ChunkMetadata,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        repository_id: String,
        file_path: String,
        content: String,
        start_line: u32,
        end_line: u32,
        language: Language,
        chunk_type: ChunkType,
    ) -> Self {
        Self {
            id,
            repository_id,
            file_path,
            content,
            start_line,
            end_line,
            language,
            chunk_type,
            symbol_name: None,
            parent_symbol: None,
            metadata: ChunkMetadata::default(),
        }
    }

    /// `file:<relative-path>::<chunkType>::<name>` — for methods `name` is
    /// `Class.method`. Stable across re-parses as long as the declaration's
    /// qualified name doesn't change, independent of line position, so a
    /// file reformat that doesn't rename anything doesn't spuriously churn
    /// the BM25/vector-store entries.
    pub fn make_id(file_path: &str, chunk_type: ChunkType, name: Option<&str>) -> String {
        format!(
            "file:{file_path}::{chunk_type}::{}",
            name.unwrap_or(chunk_type.as_str())
        )
    }

    /// Appends the `#<n>` sub-chunk suffix used when a declaration exceeds
    /// `maxTokensPerChunk` and is split into ordered sub-chunks.
    pub fn make_sub_id(base_id: &str, n: usize) -> String {
        format!("{base_id}#{n}")
    }

    pub fn with_symbol_name(mut self, name: impl Into<String>) -> Self {
        self.symbol_name = Some(name.into());
        self
    }

    pub fn with_parent_symbol(mut self, name: impl Into<String>) -> Self {
        self.parent_symbol = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn set_nl_summary(&mut self, summary: String) {
        self.metadata.nl_summary = Some(summary);
    }

    /// Builder form of [`Chunk::set_nl_summary`], for reconstructing a chunk
    /// whose summary was persisted alongside the rest of its columns.
    pub fn with_nl_summary(mut self, summary: impl Into<String>) -> Self {
        self.metadata.nl_summary = Some(summary.into());
        self
    }

    pub fn with_declarations(mut self, declarations: Vec<String>) -> Self {
        self.metadata.declarations = declarations;
        self
    }

    pub fn with_doc_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.doc_title = Some(title.into());
        self
    }

    /// Stamps the multi-repo index's repo name onto this chunk's metadata.
    /// Left unset (`None`) on the single-repo indexing path.
    pub fn set_repo_name(&mut self, repo_name: impl Into<String>) {
        self.metadata.repo_name = Some(repo_name.into());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    pub fn symbol_name(&self) -> Option<&str> {
        self.symbol_name.as_deref()
    }

    pub fn parent_symbol(&self) -> Option<&str> {
        self.parent_symbol.as_deref()
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    pub fn nl_summary(&self) -> Option<&str> {
        self.metadata.nl_summary.as_deref()
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }

    /// `Class.method` for a nested declaration, bare `name` otherwise.
    /// `symbol_name` is always the declaration's own (unqualified) name;
    /// `parent_symbol`, when present, is already the enclosing scope's own
    /// qualified name, so a single `.` join here is the only join needed
    /// regardless of nesting depth.
    pub fn qualified_name(&self) -> Option<String> {
        match (&self.parent_symbol, &self.symbol_name) {
            (Some(parent), Some(name)) => Some(format!("{parent}.{name}")),
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        }
    }

    pub fn belongs_to_repository(&self, repository_id: &str) -> bool {
        self.repository_id == repository_id
    }

    /// Text embedded by the EmbeddingProvider: `nlSummary + "\n\n" + content`
    /// when a summary is present, else bare `content`.
    pub fn embedding_text(&self) -> String {
        match self.nl_summary() {
            Some(summary) => format!("{summary}\n\n{}", self.content),
            None => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk() -> Chunk {
        Chunk::new(
            Chunk::make_id("src/lib.rs", ChunkType::Function, Some("parse")),
            "repo-a".to_string(),
            "src/lib.rs".to_string(),
            "fn parse() {}".to_string(),
            10,
            12,
            Language::Rust,
            ChunkType::Function,
        )
        .with_symbol_name("parse")
    }

    #[test]
    fn id_is_deterministic() {
        let a = Chunk::make_id("src/lib.rs", ChunkType::Function, Some("parse"));
        let b = Chunk::make_id("src/lib.rs", ChunkType::Function, Some("parse"));
        assert_eq!(a, b);
        assert_eq!(a, "file:src/lib.rs::function::parse");
    }

    #[test]
    fn sub_chunk_id_appends_suffix() {
        let base = Chunk::make_id("src/lib.rs", ChunkType::Function, Some("parse"));
        assert_eq!(Chunk::make_sub_id(&base, 2), format!("{base}#2"));
    }

    #[test]
    fn line_count_is_inclusive() {
        let chunk = make_chunk();
        assert_eq!(chunk.line_count(), 3);
    }

    #[test]
    fn qualified_name_combines_parent_and_symbol() {
        let chunk = make_chunk().with_parent_symbol("Parser");
        assert_eq!(chunk.qualified_name().as_deref(), Some("Parser.parse"));
    }

    #[test]
    fn embedding_text_includes_summary_when_present() {
        let mut chunk = make_chunk();
        chunk.set_nl_summary("Parses the input buffer.".to_string());
        let text = chunk.embedding_text();
        assert_eq!(text, "Parses the input buffer.\n\nfn parse() {}");
    }

    #[test]
    fn embedding_text_is_bare_content_without_summary() {
        let chunk = make_chunk();
        assert_eq!(chunk.embedding_text(), "fn parse() {}");
    }

    #[test]
    fn chunk_type_classification() {
        assert!(ChunkType::Function.is_callable());
        assert!(ChunkType::Struct.is_type_definition());
        assert!(!ChunkType::Block.is_type_definition());
    }
}
