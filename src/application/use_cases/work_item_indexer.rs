use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::application::{EmbeddingProvider, VectorStore, WorkItemProvider};
use crate::domain::{
    Bm25Index, Chunk, ChunkType, DependencyGraph, DomainError, EdgeKind, GraphEdge, GraphNode,
    Language, NodeKind,
};

/// `externalId -> content hash` map backing the incremental skip for backlog
/// items, the work-item analogue of `IndexState`.
pub type BacklogState = BTreeMap<String, String>;

fn hash_item(title: &str, description: &str, state: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(state.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Indexes backlog/ticket items fetched from a [`WorkItemProvider`] as
/// additional "doc" chunks, after the code phase completes (§4.E.3). Unlike
/// the code path, BM25 updates here are append-only (no prior-ids removal
/// pass across the whole index) and the embed/store step reuses the same
/// embedding provider and vector store as the code index.
pub struct WorkItemIndexerUseCase {
    provider: Arc<dyn WorkItemProvider>,
    vector_store: Arc<dyn VectorStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    reference_pattern: String,
}

impl WorkItemIndexerUseCase {
    pub fn new(
        provider: Arc<dyn WorkItemProvider>,
        vector_store: Arc<dyn VectorStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            provider,
            vector_store,
            embedding_provider,
            reference_pattern: "AB#".to_string(),
        }
    }

    pub fn with_reference_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.reference_pattern = pattern.into();
        self
    }

    /// Fetches items for `query`, skips ones whose hash is unchanged in
    /// `backlog_state`, embeds and upserts the rest, appends their BM25
    /// postings, and links them into `graph` both forward (declared code
    /// links) and backward (textual references found in `code_chunks`).
    pub async fn index(
        &self,
        repository_id: &str,
        query: &str,
        backlog_state: &mut BacklogState,
        bm25: &mut Bm25Index,
        graph: &mut DependencyGraph,
        code_chunks: &[Chunk],
    ) -> Result<usize, DomainError> {
        let items = self.provider.get_items(query).await?;
        let mut pending_chunks = Vec::new();

        for item in &items {
            let hash = hash_item(&item.title, &item.description, &item.state);
            if backlog_state.get(&item.external_id) == Some(&hash) {
                continue;
            }

            let id = format!("backlog:{}", item.external_id);
            let chunk = Chunk::new(
                id.clone(),
                repository_id.to_string(),
                format!("backlog/{}", item.external_id),
                item.as_markdown(),
                1,
                1,
                Language::Markdown,
                ChunkType::Doc,
            )
            .with_symbol_name(item.title.clone());

            pending_chunks.push(chunk);
            backlog_state.insert(item.external_id.clone(), hash);
        }

        if pending_chunks.is_empty() {
            info!("work items: no changed items for query {query:?}");
            return Ok(0);
        }

        let dimensions = self.embedding_provider.dimensions();
        let texts: Vec<String> = pending_chunks.iter().map(Chunk::embedding_text).collect();
        let vectors = self.embedding_provider.embed(&texts).await?;
        if vectors.len() != pending_chunks.len() {
            return Err(DomainError::embed(format!(
                "embedding provider returned {} vectors for {} work items",
                vectors.len(),
                pending_chunks.len()
            )));
        }
        for v in &vectors {
            if v.len() != dimensions {
                return Err(DomainError::config(format!(
                    "embedding dimension mismatch: expected {dimensions}, got {}",
                    v.len()
                )));
            }
        }

        let ids: Vec<String> = pending_chunks.iter().map(|c| c.id().to_string()).collect();
        self.vector_store.upsert(&ids, &vectors, &pending_chunks).await?;

        for chunk in &pending_chunks {
            bm25.add(chunk.id(), &chunk.embedding_text());
        }

        for (item, chunk) in items.iter().zip(pending_chunks.iter()) {
            if !ids.contains(&chunk.id().to_string()) {
                continue;
            }
            self.link_item(graph, item, chunk.id());
        }

        self.link_reverse_references(graph, &items, code_chunks);

        info!("work items: indexed {} changed item(s)", pending_chunks.len());
        Ok(pending_chunks.len())
    }

    fn link_item(&self, graph: &mut DependencyGraph, item: &crate::application::WorkItem, backlog_id: &str) {
        graph.add_node(GraphNode {
            id: backlog_id.to_string(),
            file_path: String::new(),
            symbols: vec![item.title.clone()],
            kind: NodeKind::Backlog,
        });

        for path in &item.linked_code_paths {
            let file_node_id = format!("file:{path}");
            if graph.has_node(&file_node_id) {
                graph.add_edge(GraphEdge {
                    source: backlog_id.to_string(),
                    target: file_node_id,
                    kind: EdgeKind::References,
                });
            }
        }
    }

    /// Scans every code chunk's content for `<reference_pattern><digits>`
    /// occurrences and, when the matched id names a known work item, adds a
    /// reverse `file -> backlog` edge.
    fn link_reverse_references(
        &self,
        graph: &mut DependencyGraph,
        items: &[crate::application::WorkItem],
        code_chunks: &[Chunk],
    ) {
        let known: BTreeMap<String, String> = items
            .iter()
            .map(|item| (format!("{}{}", self.reference_pattern, item.external_id), format!("backlog:{}", item.external_id)))
            .collect();
        if known.is_empty() {
            return;
        }

        for chunk in code_chunks {
            let file_node_id = format!("file:{}", chunk.file_path());
            if !graph.has_node(&file_node_id) {
                continue;
            }
            for (pattern, backlog_id) in &known {
                if chunk.content().contains(pattern) && graph.has_node(backlog_id) {
                    graph.add_edge(GraphEdge {
                        source: file_node_id.clone(),
                        target: backlog_id.clone(),
                        kind: EdgeKind::References,
                    });
                }
            }
        }
    }
}
