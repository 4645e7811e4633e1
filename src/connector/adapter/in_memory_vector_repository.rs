use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{VectorMatch, VectorQueryFilters, VectorStore};
use crate::domain::{Chunk, DomainError};

/// Brute-force cosine-similarity vector store over an in-memory map, used for
/// tests and offline demos where spinning up DuckDB's VSS extension isn't
/// worth it.
pub struct InMemoryVectorRepository {
    chunks: Arc<Mutex<HashMap<String, Chunk>>>,
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
}

impl InMemoryVectorRepository {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(Mutex::new(HashMap::new())),
            vectors: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryVectorRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Mints a fresh [`InMemoryVectorRepository`] per namespace — each instance
/// is its own independent map, so unlike the DuckDB factory there's no
/// shared-connection bookkeeping needed between namespaces.
#[derive(Default)]
pub struct InMemoryVectorStoreFactory;

#[async_trait]
impl crate::application::VectorStoreFactory for InMemoryVectorStoreFactory {
    async fn open(&self, _namespace: &str) -> Result<Arc<dyn VectorStore>, DomainError> {
        Ok(Arc::new(InMemoryVectorRepository::new()))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

fn matches_filters(chunk: &Chunk, filters: &VectorQueryFilters) -> bool {
    if let Some(languages) = &filters.languages {
        if !languages.iter().any(|l| l == chunk.language().as_str()) {
            return false;
        }
    }
    if let Some(chunk_types) = &filters.chunk_types {
        if !chunk_types.iter().any(|t| t == chunk.chunk_type().as_str()) {
            return false;
        }
    }
    if let Some(repo_ids) = &filters.repository_ids {
        if !repo_ids.iter().any(|id| id == chunk.repository_id()) {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorStore for InMemoryVectorRepository {
    async fn connect(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> Result<(), DomainError> {
        if ids.len() != vectors.len() || ids.len() != chunks.len() {
            return Err(DomainError::store(
                "in-memory vector store: ids/vectors/chunks length mismatch",
            ));
        }

        let mut chunk_store = self.chunks.lock().await;
        let mut vector_store = self.vectors.lock().await;

        for ((id, vector), chunk) in ids.iter().zip(vectors.iter()).zip(chunks.iter()) {
            chunk_store.insert(id.clone(), chunk.clone());
            vector_store.insert(id.clone(), vector.clone());
        }

        debug!("upserted {} chunk(s) to memory", ids.len());
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        let chunk_store = self.chunks.lock().await;
        let vector_store = self.vectors.lock().await;

        let mut scored: Vec<(String, f32)> = vector_store
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(vector, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::new();
        for (id, score) in scored {
            if results.len() >= k {
                break;
            }
            let Some(chunk) = chunk_store.get(&id) else {
                continue;
            };
            if !matches_filters(chunk, filters) {
                continue;
            }
            results.push(VectorMatch {
                id,
                score,
                chunk: chunk.clone(),
            });
        }

        Ok(results)
    }

    async fn query_text(
        &self,
        _terms: &[String],
        _k: usize,
        _filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        Ok(Vec::new())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, DomainError> {
        let chunk_store = self.chunks.lock().await;
        Ok(ids.iter().filter_map(|id| chunk_store.get(id).cloned()).collect())
    }

    async fn export_all(&self) -> Result<Vec<(String, Vec<f32>, Chunk)>, DomainError> {
        let chunk_store = self.chunks.lock().await;
        let vector_store = self.vectors.lock().await;
        Ok(chunk_store
            .iter()
            .filter_map(|(id, chunk)| vector_store.get(id).map(|v| (id.clone(), v.clone(), chunk.clone())))
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), DomainError> {
        let mut chunk_store = self.chunks.lock().await;
        let mut vector_store = self.vectors.lock().await;
        for id in ids {
            chunk_store.remove(id);
            vector_store.remove(id);
        }
        Ok(())
    }

    async fn delete_by_file_path(
        &self,
        repository_id: &str,
        file_path: &str,
    ) -> Result<u64, DomainError> {
        let mut chunk_store = self.chunks.lock().await;
        let mut vector_store = self.vectors.lock().await;

        let ids: Vec<String> = chunk_store
            .values()
            .filter(|c| c.repository_id() == repository_id && c.file_path() == file_path)
            .map(|c| c.id().to_string())
            .collect();

        for id in &ids {
            chunk_store.remove(id);
            vector_store.remove(id);
        }

        Ok(ids.len() as u64)
    }

    async fn delete_by_repository(&self, repository_id: &str) -> Result<(), DomainError> {
        let mut chunk_store = self.chunks.lock().await;
        let mut vector_store = self.vectors.lock().await;

        let ids: Vec<String> = chunk_store
            .values()
            .filter(|chunk| chunk.repository_id() == repository_id)
            .map(|chunk| chunk.id().to_string())
            .collect();

        for id in ids {
            chunk_store.remove(&id);
            vector_store.remove(&id);
        }

        Ok(())
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let chunks = self.chunks.lock().await;
        Ok(chunks.len() as u64)
    }

    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkType, Language};

    fn chunk(id: &str, repo: &str, path: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            repo.to_string(),
            path.to_string(),
            "fn f() {}".to_string(),
            1,
            1,
            Language::Rust,
            ChunkType::Function,
        )
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() {
        let store = InMemoryVectorRepository::new();
        store
            .upsert(
                &["a".to_string(), "b".to_string()],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                &[chunk("a", "repo", "a.rs"), chunk("b", "repo", "b.rs")],
            )
            .await
            .unwrap();

        let results = store
            .query(&[1.0, 0.0], 10, &VectorQueryFilters::default())
            .await
            .unwrap();

        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn delete_by_file_path_removes_matching_chunks_only() {
        let store = InMemoryVectorRepository::new();
        store
            .upsert(
                &["a".to_string(), "b".to_string()],
                &[vec![1.0], vec![1.0]],
                &[chunk("a", "repo", "a.rs"), chunk("b", "repo", "b.rs")],
            )
            .await
            .unwrap();

        let removed = store.delete_by_file_path("repo", "a.rs").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_repository_clears_everything_in_it() {
        let store = InMemoryVectorRepository::new();
        store
            .upsert(
                &["a".to_string()],
                &[vec![1.0]],
                &[chunk("a", "repo", "a.rs")],
            )
            .await
            .unwrap();

        store.delete_by_repository("repo").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_by_ids_skips_missing_ids() {
        let store = InMemoryVectorRepository::new();
        store
            .upsert(
                &["a".to_string()],
                &[vec![1.0]],
                &[chunk("a", "repo", "a.rs")],
            )
            .await
            .unwrap();

        let found = store
            .get_by_ids(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "a");
    }
}
