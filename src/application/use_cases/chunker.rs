use crate::application::interfaces::{Declaration, ParsedFile};
use crate::domain::{Chunk, ChunkType, Language};

const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 2000;

fn estimate_tokens(content: &str) -> usize {
    (content.len() as f64 / 4.0).ceil() as usize
}

fn chunk_type_for_kind(kind: &str) -> ChunkType {
    match kind {
        "function" => ChunkType::Function,
        "method" => ChunkType::Method,
        "class" => ChunkType::Class,
        "struct" => ChunkType::Struct,
        "enum" => ChunkType::Enum,
        "trait" => ChunkType::Trait,
        "interface" => ChunkType::Interface,
        "impl" => ChunkType::Impl,
        "module" | "namespace" => ChunkType::Module,
        "const" | "constant" | "static" => ChunkType::Constant,
        "type" | "type_alias" | "typedef" => ChunkType::TypeDef,
        _ => ChunkType::Block,
    }
}

pub struct ChunkerUseCase {
    max_tokens_per_chunk: usize,
}

impl ChunkerUseCase {
    pub fn new() -> Self {
        Self {
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
        }
    }

    pub fn with_max_tokens_per_chunk(mut self, max_tokens: usize) -> Self {
        self.max_tokens_per_chunk = max_tokens.max(1);
        self
    }

    /// Code-mode chunking: one chunk per declaration in the tree (top-level
    /// and nested, e.g. methods under a class), oversize declarations split
    /// into ordered sub-chunks.
    pub fn chunk(&self, repository_id: &str, parsed: &ParsedFile) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for decl in &parsed.root_declarations {
            self.chunk_declaration(repository_id, &parsed.file_path, parsed.language, decl, None, &mut chunks);
        }
        chunks
    }

    fn chunk_declaration(
        &self,
        repository_id: &str,
        file_path: &str,
        language: Language,
        decl: &Declaration,
        parent_name: Option<&str>,
        out: &mut Vec<Chunk>,
    ) {
        let chunk_type = chunk_type_for_kind(&decl.kind);
        let qualified_name = match (parent_name, &decl.name) {
            (Some(parent), Some(name)) => Some(format!("{parent}.{name}")),
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        };

        let base_id = Chunk::make_id(file_path, chunk_type, qualified_name.as_deref());
        let sub_chunks = self.split_if_oversize(
            repository_id,
            file_path,
            language,
            chunk_type,
            &base_id,
            decl.name.as_deref(),
            parent_name,
            decl,
        );
        out.extend(sub_chunks);

        for child in &decl.children {
            self.chunk_declaration(
                repository_id,
                file_path,
                language,
                child,
                qualified_name.as_deref(),
                out,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn split_if_oversize(
        &self,
        repository_id: &str,
        file_path: &str,
        language: Language,
        chunk_type: ChunkType,
        base_id: &str,
        symbol_name: Option<&str>,
        parent_name: Option<&str>,
        decl: &Declaration,
    ) -> Vec<Chunk> {
        let declarations: Vec<String> = decl.children.iter().filter_map(|c| c.name.clone()).collect();

        if estimate_tokens(&decl.content) <= self.max_tokens_per_chunk {
            let mut chunk = Chunk::new(
                base_id.to_string(),
                repository_id.to_string(),
                file_path.to_string(),
                decl.content.clone(),
                decl.start_line,
                decl.end_line,
                language,
                chunk_type,
            )
            .with_declarations(declarations);
            if let Some(name) = symbol_name {
                chunk = chunk.with_symbol_name(name);
            }
            if let Some(parent) = parent_name {
                chunk = chunk.with_parent_symbol(parent);
            }
            return vec![chunk];
        }

        split_lines_by_byte_budget(&decl.content, decl.start_line, self.max_tokens_per_chunk * 4)
            .into_iter()
            .enumerate()
            .map(|(i, (text, start_line, end_line))| {
                let id = Chunk::make_sub_id(base_id, i + 1);
                let mut chunk = Chunk::new(
                    id,
                    repository_id.to_string(),
                    file_path.to_string(),
                    text,
                    start_line,
                    end_line,
                    language,
                    chunk_type,
                )
                .with_declarations(declarations.clone());
                if let Some(name) = symbol_name {
                    chunk = chunk.with_symbol_name(name);
                }
                if let Some(parent) = parent_name {
                    chunk = chunk.with_parent_symbol(parent);
                }
                chunk
            })
            .collect()
    }

    /// Documentation-mode chunking: one chunk per Markdown section (content
    /// under a heading), `docTitle` carried as the chunk's symbol name.
    pub fn chunk_markdown(&self, repository_id: &str, file_path: &str, content: &str) -> Vec<Chunk> {
        let sections = split_markdown_sections(content);
        let mut chunks = Vec::new();

        for (title, text, start_line, end_line) in sections {
            let base_id = Chunk::make_id(file_path, ChunkType::Doc, Some(&title));
            if estimate_tokens(&text) <= self.max_tokens_per_chunk {
                let chunk = Chunk::new(
                    base_id,
                    repository_id.to_string(),
                    file_path.to_string(),
                    text,
                    start_line,
                    end_line,
                    Language::Markdown,
                    ChunkType::Doc,
                )
                .with_symbol_name(title.clone())
                .with_doc_title(title);
                chunks.push(chunk);
            } else {
                for (i, (sub_text, sub_start, sub_end)) in
                    split_lines_by_byte_budget(&text, start_line, self.max_tokens_per_chunk * 4)
                        .into_iter()
                        .enumerate()
                {
                    let chunk = Chunk::new(
                        Chunk::make_sub_id(&base_id, i + 1),
                        repository_id.to_string(),
                        file_path.to_string(),
                        sub_text,
                        sub_start,
                        sub_end,
                        Language::Markdown,
                        ChunkType::Doc,
                    )
                    .with_symbol_name(title.clone())
                    .with_doc_title(title.clone());
                    chunks.push(chunk);
                }
            }
        }
        chunks
    }
}

impl Default for ChunkerUseCase {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `content` (whose first line is `start_line`) into contiguous,
/// non-overlapping line-range pieces each under `byte_budget` bytes.
fn split_lines_by_byte_budget(
    content: &str,
    start_line: u32,
    byte_budget: usize,
) -> Vec<(String, u32, u32)> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return vec![(content.to_string(), start_line, start_line)];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_start = start_line;
    let mut line_no = start_line;

    for line in &lines {
        if !current.is_empty() && current.len() + line.len() + 1 > byte_budget {
            pieces.push((current.clone(), current_start, line_no - 1));
            current.clear();
            current_start = line_no;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        line_no += 1;
    }
    if !current.is_empty() {
        pieces.push((current, current_start, line_no - 1));
    }
    pieces
}

/// Splits Markdown content into `(title, body, start_line, end_line)`
/// sections, one per heading (any level). Content before the first heading
/// is attached to a synthetic "Introduction" section when non-empty.
fn split_markdown_sections(content: &str) -> Vec<(String, String, u32, u32)> {
    let mut sections = Vec::new();
    let mut current_title = "Introduction".to_string();
    let mut current_body = String::new();
    let mut current_start = 1u32;
    let mut line_no = 1u32;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if !current_body.trim().is_empty() {
                sections.push((
                    current_title.clone(),
                    current_body.trim_end().to_string(),
                    current_start,
                    line_no - 1,
                ));
            }
            current_title = trimmed.trim_start_matches('#').trim().to_string();
            current_body.clear();
            current_start = line_no;
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
        line_no += 1;
    }
    if !current_body.trim().is_empty() {
        sections.push((
            current_title,
            current_body.trim_end().to_string(),
            current_start,
            line_no - 1,
        ));
    }
    sections
}
