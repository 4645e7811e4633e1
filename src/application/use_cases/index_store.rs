use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::{EmbeddingProvider, VectorStore};
use crate::domain::{
    Bm25Index, Chunk, DependencyGraph, DomainError, EdgeKind, FileState, GraphEdge, GraphNode,
    IndexState, NodeKind,
};

const EMBED_BATCH_SIZE: usize = 64;

/// Outcome of applying one incremental batch: how many chunks were written
/// and how many prior chunk ids were retired.
#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    pub chunks_written: usize,
    pub chunks_retired: usize,
    pub written_ids: Vec<String>,
    pub written_vectors: Vec<Vec<f32>>,
    pub written_chunks: Vec<Chunk>,
    pub retired_ids: Vec<String>,
}

/// Embeds, persists, and cross-indexes a batch of freshly scanned+chunked
/// (and usually enriched) chunks against the vector store, the BM25 index,
/// the dependency graph, and the incremental `IndexState`. Owns none of
/// those structures — the Orchestrator holds them across phases and passes
/// mutable references in, so a single instance can serve both the
/// single-repo and multi-repo (shared root index) paths.
pub struct IndexStoreUseCase {
    vector_store: Arc<dyn VectorStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl IndexStoreUseCase {
    pub fn new(vector_store: Arc<dyn VectorStore>, embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            vector_store,
            embedding_provider,
        }
    }

    /// Applies one incremental update for `repository_id`: retires the prior
    /// chunks of every file in `changed_files` and `deleted_files` from the
    /// vector store, BM25 index, and dependency graph, embeds and upserts
    /// `new_chunks` (which must cover exactly `changed_files`), and records
    /// the resulting `FileState` entries (content hash + owned chunk ids)
    /// for `changed_files`. `deleted_files` entries are dropped outright.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply(
        &self,
        repository_id: &str,
        changed_files: &[(String, String)],
        deleted_files: &[String],
        new_chunks: Vec<Chunk>,
        bm25: &mut Bm25Index,
        graph: &mut DependencyGraph,
        index_state: &mut IndexState,
    ) -> Result<ApplyResult, DomainError> {
        let mut touched_paths: BTreeSet<String> = deleted_files.iter().cloned().collect();
        touched_paths.extend(changed_files.iter().map(|(path, _)| path.clone()));

        let mut retired_ids: Vec<String> = Vec::new();
        for path in &touched_paths {
            if let Some(state) = index_state.get(path) {
                retired_ids.extend(state.chunk_ids.iter().cloned());
            }
        }

        if !retired_ids.is_empty() {
            self.vector_store.delete_by_ids(&retired_ids).await?;
            bm25.remove_by_ids(&retired_ids);
        }
        graph.remove_by_file_paths(&touched_paths);

        for path in deleted_files {
            self.vector_store.delete_by_file_path(repository_id, path).await?;
            index_state.remove(path);
        }

        let dimensions = self.embedding_provider.dimensions();
        let mut embedded_ids: Vec<String> = Vec::with_capacity(new_chunks.len());
        let mut embedded_vectors: Vec<Vec<f32>> = Vec::with_capacity(new_chunks.len());

        for batch in new_chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(Chunk::embedding_text).collect();
            let vectors = self.embedding_provider.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(DomainError::embed(format!(
                    "embedding provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors.into_iter()) {
                if vector.len() != dimensions {
                    return Err(DomainError::config(format!(
                        "embedding dimension mismatch: expected {dimensions}, got {}",
                        vector.len()
                    )));
                }
                embedded_ids.push(chunk.id().to_string());
                embedded_vectors.push(vector);
            }
        }

        if !new_chunks.is_empty() {
            self.vector_store
                .upsert(&embedded_ids, &embedded_vectors, &new_chunks)
                .await?;
        }

        for chunk in &new_chunks {
            bm25.add(chunk.id(), &chunk.embedding_text());
        }

        self.update_graph(graph, &new_chunks);

        let mut by_file: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for chunk in &new_chunks {
            by_file
                .entry(chunk.file_path().to_string())
                .or_default()
                .push(chunk.id().to_string());
        }

        for (path, content_hash) in changed_files {
            let chunk_ids = by_file.remove(path).unwrap_or_default();
            index_state.insert(FileState::new(
                path.clone(),
                content_hash.clone(),
                now_rfc3339(),
                chunk_ids,
            ));
        }

        debug!(
            "index store: retired {} chunks, wrote {} chunks for {}",
            retired_ids.len(),
            new_chunks.len(),
            repository_id
        );

        let chunks_written = new_chunks.len();
        let chunks_retired = retired_ids.len();
        Ok(ApplyResult {
            chunks_written,
            chunks_retired,
            written_ids: embedded_ids,
            written_vectors: embedded_vectors,
            written_chunks: new_chunks,
            retired_ids,
        })
    }

    /// Rebuilds the dependency graph's file nodes, symbol nodes, and
    /// declared-import edges for a batch of freshly written chunks. Called
    /// after the prior subgraph for these files has already been dropped by
    /// `remove_by_file_paths`.
    fn update_graph(&self, graph: &mut DependencyGraph, chunks: &[Chunk]) {
        for chunk in chunks {
            let file_node_id = format!("file:{}", chunk.file_path());
            graph.add_node(GraphNode {
                id: file_node_id.clone(),
                file_path: chunk.file_path().to_string(),
                symbols: vec![],
                kind: NodeKind::File,
            });

            if let Some(name) = chunk.qualified_name() {
                let symbol_node_id = chunk.id().to_string();
                graph.add_node(GraphNode {
                    id: symbol_node_id.clone(),
                    file_path: chunk.file_path().to_string(),
                    symbols: vec![name],
                    kind: NodeKind::Symbol,
                });
                graph.add_edge(GraphEdge {
                    source: file_node_id.clone(),
                    target: symbol_node_id,
                    kind: EdgeKind::References,
                });
            }

            for import in &chunk.metadata().imports {
                let target_id = format!("file:{import}");
                if graph.has_node(&target_id) {
                    graph.add_edge(GraphEdge {
                        source: file_node_id.clone(),
                        target: target_id,
                        kind: EdgeKind::Imports,
                    });
                }
            }
        }
    }
}

/// RFC 3339 timestamp for `FileState::last_indexed_at`. Callers that need
/// determinism in tests supply their own clock via `IndexState` directly;
/// this wall-clock stamp is informational only and never participates in
/// dirty-detection (`IndexState::is_dirty` compares content hashes).
fn now_rfc3339() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    humantime_rfc3339(secs)
}

fn humantime_rfc3339(epoch_secs: u64) -> String {
    let days = epoch_secs / 86_400;
    let rem = epoch_secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (y, mo, d) = civil_from_days(days as i64);
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{m:02}:{s:02}Z")
}

/// Howard Hinnant's days-from-civil algorithm, inverted. No local crate in
/// the dependency stack does RFC 3339 formatting from a raw epoch without
/// pulling in a full datetime dependency for a single informational field.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::VectorQueryFilters;
    use crate::application::interfaces::vector_store::VectorMatch;
    use crate::domain::{ChunkType, EmbeddingConfig, Language};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct InMemoryStore {
        chunks: Mutex<std::collections::BTreeMap<String, Chunk>>,
    }

    #[async_trait]
    impl VectorStore for InMemoryStore {
        async fn connect(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn upsert(&self, ids: &[String], _vectors: &[Vec<f32>], chunks: &[Chunk]) -> Result<(), DomainError> {
            let mut guard = self.chunks.lock().unwrap();
            for (id, chunk) in ids.iter().zip(chunks.iter()) {
                guard.insert(id.clone(), chunk.clone());
            }
            Ok(())
        }

        async fn query(&self, _vector: &[f32], _k: usize, _filters: &VectorQueryFilters) -> Result<Vec<VectorMatch>, DomainError> {
            Ok(vec![])
        }

        async fn query_text(&self, _terms: &[String], _k: usize, _filters: &VectorQueryFilters) -> Result<Vec<VectorMatch>, DomainError> {
            Ok(vec![])
        }

        async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, DomainError> {
            let guard = self.chunks.lock().unwrap();
            Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
        }

        async fn delete_by_ids(&self, ids: &[String]) -> Result<(), DomainError> {
            let mut guard = self.chunks.lock().unwrap();
            for id in ids {
                guard.remove(id);
            }
            Ok(())
        }

        async fn delete_by_file_path(&self, _repository_id: &str, file_path: &str) -> Result<u64, DomainError> {
            let mut guard = self.chunks.lock().unwrap();
            let before = guard.len();
            guard.retain(|_, c| c.file_path() != file_path);
            Ok((before - guard.len()) as u64)
        }

        async fn delete_by_repository(&self, _repository_id: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn export_all(&self) -> Result<Vec<(String, Vec<f32>, Chunk)>, DomainError> {
            let guard = self.chunks.lock().unwrap();
            Ok(guard.iter().map(|(id, c)| (id.clone(), vec![0.1, 0.2, 0.3], c.clone())).collect())
        }

        async fn count(&self) -> Result<u64, DomainError> {
            Ok(self.chunks.lock().unwrap().len() as u64)
        }

        async fn close(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct StubEmbedding {
        config: EmbeddingConfig,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn config(&self) -> &EmbeddingConfig {
            &self.config
        }
    }

    fn make_chunk(path: &str, name: &str) -> Chunk {
        Chunk::new(
            Chunk::make_id(path, ChunkType::Function, Some(name)),
            "repo".to_string(),
            path.to_string(),
            "fn x() {}".to_string(),
            1,
            2,
            Language::Rust,
            ChunkType::Function,
        )
        .with_symbol_name(name)
    }

    fn use_case() -> (IndexStoreUseCase, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore {
            chunks: Mutex::new(Default::default()),
        });
        let embedder = Arc::new(StubEmbedding {
            config: EmbeddingConfig::default(),
        });
        (IndexStoreUseCase::new(store.clone(), embedder), store)
    }

    #[tokio::test]
    async fn apply_writes_chunks_and_updates_index_state() {
        let (use_case, store) = use_case();
        let mut bm25 = Bm25Index::new();
        let mut graph = DependencyGraph::new();
        let mut index_state = IndexState::new();

        let chunk = make_chunk("a.rs", "foo");
        let changed = vec![("a.rs".to_string(), "hash1".to_string())];
        let result = use_case
            .apply("repo", &changed, &[], vec![chunk.clone()], &mut bm25, &mut graph, &mut index_state)
            .await
            .unwrap();

        assert_eq!(result.chunks_written, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(bm25.doc_count(), 1);
        assert!(graph.has_node("file:a.rs"));
        assert_eq!(index_state.get("a.rs").unwrap().chunk_ids, vec![chunk.id().to_string()]);
    }

    #[tokio::test]
    async fn reapplying_retires_prior_chunks_for_the_file() {
        let (use_case, store) = use_case();
        let mut bm25 = Bm25Index::new();
        let mut graph = DependencyGraph::new();
        let mut index_state = IndexState::new();

        let old_chunk = make_chunk("a.rs", "foo");
        let changed = vec![("a.rs".to_string(), "hash1".to_string())];
        use_case
            .apply("repo", &changed, &[], vec![old_chunk], &mut bm25, &mut graph, &mut index_state)
            .await
            .unwrap();

        let new_chunk = make_chunk("a.rs", "bar");
        let changed2 = vec![("a.rs".to_string(), "hash2".to_string())];
        use_case
            .apply("repo", &changed2, &[], vec![new_chunk.clone()], &mut bm25, &mut graph, &mut index_state)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(index_state.get("a.rs").unwrap().chunk_ids, vec![new_chunk.id().to_string()]);
    }

    #[tokio::test]
    async fn deleted_files_are_dropped_from_index_state_and_store() {
        let (use_case, store) = use_case();
        let mut bm25 = Bm25Index::new();
        let mut graph = DependencyGraph::new();
        let mut index_state = IndexState::new();

        let chunk = make_chunk("a.rs", "foo");
        let changed = vec![("a.rs".to_string(), "hash1".to_string())];
        use_case
            .apply("repo", &changed, &[], vec![chunk], &mut bm25, &mut graph, &mut index_state)
            .await
            .unwrap();

        use_case
            .apply("repo", &[], &["a.rs".to_string()], vec![], &mut bm25, &mut graph, &mut index_state)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(index_state.get("a.rs").is_none());
        assert!(!graph.has_node("file:a.rs"));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_fatal_config_error() {
        struct WrongDims(EmbeddingConfig);

        #[async_trait]
        impl EmbeddingProvider for WrongDims {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
                Ok(texts.iter().map(|_| vec![0.0; 5]).collect())
            }
            fn dimensions(&self) -> usize {
                3
            }
            fn config(&self) -> &EmbeddingConfig {
                &self.0
            }
        }

        let store = Arc::new(InMemoryStore {
            chunks: Mutex::new(Default::default()),
        });
        let use_case = IndexStoreUseCase::new(store, Arc::new(WrongDims(EmbeddingConfig::default())));
        let mut bm25 = Bm25Index::new();
        let mut graph = DependencyGraph::new();
        let mut index_state = IndexState::new();

        let chunk = make_chunk("a.rs", "foo");
        let changed = vec![("a.rs".to_string(), "hash1".to_string())];
        let result = use_case
            .apply("repo", &changed, &[], vec![chunk], &mut bm25, &mut graph, &mut index_state)
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_fatal());
    }
}
