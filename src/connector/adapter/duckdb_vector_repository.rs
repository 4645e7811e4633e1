use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection, Row};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{VectorMatch, VectorQueryFilters, VectorStore};
use crate::domain::{Chunk, ChunkType, DomainError, Language};

/// DuckDB-backed [`VectorStore`] using the `vss` extension's HNSW index for
/// approximate nearest-neighbor search. Dimension is fixed per instance (set
/// at construction time from the embedding provider in use) since DuckDB's
/// `FLOAT[N]` array type is sized at table-creation time.
pub struct DuckdbVectorRepository {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
    dimensions: usize,
}

impl DuckdbVectorRepository {
    pub fn new(path: &Path, dimensions: usize) -> Result<Self, DomainError> {
        Self::new_with_namespace(path, "main", dimensions)
    }

    pub fn new_with_namespace(
        path: &Path,
        namespace: &str,
        dimensions: usize,
    ) -> Result<Self, DomainError> {
        let conn = Connection::open(path)
            .map_err(|e| DomainError::store(format!("Failed to open DuckDB database: {}", e)))?;
        Self::initialize(&conn, namespace, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.to_string(),
            dimensions,
        })
    }

    #[allow(dead_code)]
    pub fn in_memory(dimensions: usize) -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DomainError::store(format!("Failed to open DuckDB in-memory DB: {}", e)))?;
        let namespace = "main";
        Self::initialize(&conn, namespace, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.to_string(),
            dimensions,
        })
    }

    /// Returns a clone of the shared connection Arc.
    /// This allows other adapters to share the same DuckDB connection,
    /// which is necessary because DuckDB only allows one write connection per file.
    pub fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Opens another namespace (DuckDB schema) on an already-open connection
    /// to the same file, rather than opening the file again — a second
    /// `Connection::open` on one file conflicts with the first. Used to mint
    /// the per-repository and root-merged stores the multi-repo path needs,
    /// all backed by one `vectors.duckdb`.
    pub async fn from_shared_connection(
        conn: Arc<Mutex<Connection>>,
        namespace: &str,
        dimensions: usize,
    ) -> Result<Self, DomainError> {
        {
            let guard = conn.lock().await;
            Self::initialize(&guard, namespace, dimensions)?;
        }
        Ok(Self {
            conn,
            namespace: namespace.to_string(),
            dimensions,
        })
    }

    /// Initializes tables and enables the VSS extension.
    fn initialize(conn: &Connection, schema: &str, dimensions: usize) -> Result<(), DomainError> {
        let schema = schema.trim();
        let schema_name = if schema.is_empty() { "main" } else { schema };
        debug!("Initializing DuckDB with schema: {} ({} dims)", schema_name, dimensions);

        conn.execute_batch("INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;")
            .map_err(|e| DomainError::store(format!("Failed to initialize VSS extension: {}", e)))?;

        let schema_sql = format!(
            r#"
            CREATE SCHEMA IF NOT EXISTS "{schema}";

            CREATE TABLE IF NOT EXISTS "{schema}".chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                content TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                language TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                symbol_name TEXT,
                parent_symbol TEXT,
                repository_id TEXT NOT NULL,
                nl_summary TEXT
            );

            CREATE TABLE IF NOT EXISTS "{schema}".embeddings (
                chunk_id TEXT PRIMARY KEY,
                vector FLOAT[{dimensions}] NOT NULL
            );

            CREATE INDEX IF NOT EXISTS embedding_hnsw_idx ON "{schema}".embeddings USING HNSW (vector) WITH (metric = 'cosine');
            "#,
            schema = schema_name,
            dimensions = dimensions,
        );

        conn.execute_batch(&schema_sql)
            .map_err(|e| DomainError::store(format!("Failed to initialize DuckDB schema: {}", e)))?;

        debug!("DuckDB schema initialized successfully");
        Ok(())
    }

    fn vector_to_array_literal(&self, vector: &[f32]) -> Result<String, DomainError> {
        if vector.len() != self.dimensions {
            return Err(DomainError::invalid_input(format!(
                "Expected embedding dimension {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", self.dimensions));
        Ok(s)
    }

    fn row_to_chunk(row: &Row) -> Result<Chunk, duckdb::Error> {
        let chunk_type = match row.get::<_, String>(6)?.as_str() {
            "function" => ChunkType::Function,
            "method" => ChunkType::Method,
            "class" => ChunkType::Class,
            "struct" => ChunkType::Struct,
            "enum" => ChunkType::Enum,
            "trait" => ChunkType::Trait,
            "impl" => ChunkType::Impl,
            "module" => ChunkType::Module,
            "constant" => ChunkType::Constant,
            "type_def" => ChunkType::TypeDef,
            "interface" => ChunkType::Interface,
            "doc" => ChunkType::Doc,
            _ => ChunkType::Block,
        };

        let mut chunk = Chunk::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(9)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            u32::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
            Language::parse(&row.get::<_, String>(5)?),
            chunk_type,
        );
        if let Some(symbol) = row.get::<_, Option<String>>(7)? {
            chunk = chunk.with_symbol_name(symbol);
        }
        if let Some(parent) = row.get::<_, Option<String>>(8)? {
            chunk = chunk.with_parent_symbol(parent);
        }
        if let Some(summary) = row.get::<_, Option<String>>(10)? {
            chunk = chunk.with_nl_summary(summary);
        }
        Ok(chunk)
    }

    fn filter_clause(filters: &VectorQueryFilters) -> Vec<String> {
        let mut clauses = Vec::new();
        if let Some(languages) = &filters.languages {
            let quoted = languages
                .iter()
                .map(|l| format!("'{}'", l.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("c.language IN ({})", quoted));
        }
        if let Some(chunk_types) = &filters.chunk_types {
            let quoted = chunk_types
                .iter()
                .map(|t| format!("'{}'", t.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("c.chunk_type IN ({})", quoted));
        }
        if let Some(repo_ids) = &filters.repository_ids {
            let quoted = repo_ids
                .iter()
                .map(|r| format!("'{}'", r.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("c.repository_id IN ({})", quoted));
        }
        clauses
    }
}

#[async_trait]
impl VectorStore for DuckdbVectorRepository {
    async fn connect(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }
        if ids.len() != vectors.len() || ids.len() != chunks.len() {
            return Err(DomainError::store(
                "duckdb vector store: ids/vectors/chunks length mismatch",
            ));
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::store(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO \"{}\".chunks \
                    (id, file_path, content, start_line, end_line, language, chunk_type, symbol_name, parent_symbol, repository_id, nl_summary) \
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.namespace
                ))
                .map_err(|e| DomainError::store(format!("Failed to prepare chunk insert: {}", e)))?;

            for (id, chunk) in ids.iter().zip(chunks.iter()) {
                stmt.execute(params![
                    id,
                    chunk.file_path(),
                    chunk.content(),
                    chunk.start_line() as i64,
                    chunk.end_line() as i64,
                    chunk.language().as_str(),
                    chunk.chunk_type().as_str(),
                    chunk.symbol_name(),
                    chunk.parent_symbol(),
                    chunk.repository_id(),
                    chunk.nl_summary(),
                ])
                .map_err(|e| DomainError::store(format!("Failed to insert chunk {}: {}", id, e)))?;
            }
        }

        for (id, vector) in ids.iter().zip(vectors.iter()) {
            let array_lit = self.vector_to_array_literal(vector)?;
            // Array literal is embedded directly in SQL since DuckDB's FLOAT[N]
            // type doesn't support parameter binding; the array comes from our
            // own embedding output, not user input.
            let sql = format!(
                "INSERT OR REPLACE INTO \"{}\".embeddings (chunk_id, vector) VALUES (?, {})",
                self.namespace, array_lit
            );
            tx.execute(&sql, params![id])
                .map_err(|e| DomainError::store(format!("Failed to insert embedding for {}: {}", id, e)))?;
        }

        tx.commit()
            .map_err(|e| DomainError::store(format!("Failed to commit: {}", e)))?;

        debug!("upserted {} chunk(s) to DuckDB", ids.len());
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        let array_lit = self.vector_to_array_literal(vector)?;

        let mut sql = format!(
            "SELECT \
                c.id, c.file_path, c.content, c.start_line, c.end_line, c.language, c.chunk_type, \
                c.symbol_name, c.parent_symbol, c.repository_id, c.nl_summary, \
                1.0 - array_cosine_distance(e.vector, {array_lit}) AS score \
             FROM \"{schema}\".embeddings e \
             JOIN \"{schema}\".chunks c ON c.id = e.chunk_id",
            array_lit = array_lit,
            schema = self.namespace,
        );

        let clauses = Self::filter_clause(filters);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(e.vector, {array_lit}) LIMIT ?",
            array_lit = array_lit
        ));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::store(format!("Failed to prepare vector query: {}", e)))?;
        let mut rows = stmt
            .query(params![k as i64])
            .map_err(|e| DomainError::store(format!("Failed to run vector query: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read vector query row: {}", e)))?
        {
            let score: f32 = row
                .get(11)
                .map_err(|e| DomainError::store(format!("Failed to read score: {}", e)))?;
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::store(format!("Failed to parse chunk row: {}", e)))?;
            let id = chunk.id().to_string();
            results.push(VectorMatch { id, score, chunk });
        }
        Ok(results)
    }

    /// No keyword index is maintained alongside the HNSW table; BM25 over the
    /// full corpus is handled upstream by the hybrid-search use case.
    async fn query_text(
        &self,
        _terms: &[String],
        _k: usize,
        _filters: &VectorQueryFilters,
    ) -> Result<Vec<VectorMatch>, DomainError> {
        Ok(Vec::new())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id, file_path, content, start_line, end_line, language, chunk_type, \
             symbol_name, parent_symbol, repository_id, nl_summary \
             FROM \"{}\".chunks WHERE id IN ({})",
            self.namespace, placeholders
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::store(format!("Failed to prepare get_by_ids: {}", e)))?;
        let params: Vec<&dyn duckdb::ToSql> = ids.iter().map(|id| id as &dyn duckdb::ToSql).collect();
        let mut rows = stmt
            .query(params.as_slice())
            .map_err(|e| DomainError::store(format!("Failed to run get_by_ids: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read get_by_ids row: {}", e)))?
        {
            results.push(
                Self::row_to_chunk(row)
                    .map_err(|e| DomainError::store(format!("Failed to parse chunk row: {}", e)))?,
            );
        }
        Ok(results)
    }

    async fn export_all(&self) -> Result<Vec<(String, Vec<f32>, Chunk)>, DomainError> {
        // DuckDB's `FLOAT[N]` array has no direct Vec<f32> row conversion in
        // this driver version (the same reason `upsert` builds its literal by
        // hand), so each component is selected as its own scalar column.
        let components: Vec<String> = (1..=self.dimensions).map(|i| format!("e.vector[{i}]")).collect();
        let sql = format!(
            "SELECT c.id, c.file_path, c.content, c.start_line, c.end_line, c.language, c.chunk_type, \
             c.symbol_name, c.parent_symbol, c.repository_id, c.nl_summary, {components} \
             FROM \"{schema}\".chunks c JOIN \"{schema}\".embeddings e ON e.chunk_id = c.id",
            components = components.join(", "),
            schema = self.namespace,
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::store(format!("Failed to prepare export_all: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DomainError::store(format!("Failed to run export_all: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read export_all row: {}", e)))?
        {
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::store(format!("Failed to parse chunk row: {}", e)))?;
            let mut vector = Vec::with_capacity(self.dimensions);
            for i in 0..self.dimensions {
                let component: f32 = row
                    .get(11 + i)
                    .map_err(|e| DomainError::store(format!("Failed to read vector component: {}", e)))?;
                vector.push(component);
            }
            let id = chunk.id().to_string();
            results.push((id, vector, chunk));
        }
        Ok(results)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::store(format!("Failed to begin transaction: {}", e)))?;

        for id in ids {
            tx.execute(
                &format!("DELETE FROM \"{}\".embeddings WHERE chunk_id = ?", self.namespace),
                params![id],
            )
            .map_err(|e| DomainError::store(format!("Failed to delete embedding: {}", e)))?;
            tx.execute(
                &format!("DELETE FROM \"{}\".chunks WHERE id = ?", self.namespace),
                params![id],
            )
            .map_err(|e| DomainError::store(format!("Failed to delete chunk: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| DomainError::store(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    async fn delete_by_file_path(
        &self,
        repository_id: &str,
        file_path: &str,
    ) -> Result<u64, DomainError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::store(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            &format!(
                "DELETE FROM \"{0}\".embeddings WHERE chunk_id IN (SELECT id FROM \"{0}\".chunks WHERE repository_id = ? AND file_path = ?)",
                self.namespace
            ),
            params![repository_id, file_path],
        )
        .map_err(|e| DomainError::store(format!("Failed to delete embeddings: {}", e)))?;

        let deleted_count = tx
            .execute(
                &format!(
                    "DELETE FROM \"{}\".chunks WHERE repository_id = ? AND file_path = ?",
                    self.namespace
                ),
                params![repository_id, file_path],
            )
            .map_err(|e| DomainError::store(format!("Failed to delete chunks: {}", e)))?;

        tx.commit()
            .map_err(|e| DomainError::store(format!("Failed to commit: {}", e)))?;

        debug!(
            "Deleted {} chunks for file {} in repository {}",
            deleted_count, file_path, repository_id
        );
        Ok(deleted_count as u64)
    }

    async fn delete_by_repository(&self, repository_id: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::store(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            &format!(
                "DELETE FROM \"{0}\".embeddings WHERE chunk_id IN (SELECT id FROM \"{0}\".chunks WHERE repository_id = ?)",
                self.namespace
            ),
            params![repository_id],
        )
        .map_err(|e| DomainError::store(format!("Failed to delete embeddings: {}", e)))?;

        tx.execute(
            &format!("DELETE FROM \"{}\".chunks WHERE repository_id = ?", self.namespace),
            params![repository_id],
        )
        .map_err(|e| DomainError::store(format!("Failed to delete chunks: {}", e)))?;

        tx.commit()
            .map_err(|e| DomainError::store(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\".chunks", self.namespace), [], |row| {
                row.get(0)
            })
            .map_err(|e| DomainError::store(format!("Failed to count chunks: {}", e)))?;
        Ok(count as u64)
    }

    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    async fn upsert_and_query_round_trip() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
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
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_preserves_nl_summary_across_query() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        let enriched = chunk("a", "repo", "a.rs").with_nl_summary("adds two numbers");
        store
            .upsert(&["a".to_string()], &[vec![1.0, 0.0]], &[enriched])
            .await
            .unwrap();

        let results = store
            .query(&[1.0, 0.0], 10, &VectorQueryFilters::default())
            .await
            .unwrap();
        assert_eq!(results[0].chunk.nl_summary(), Some("adds two numbers"));

        let by_id = store.get_by_ids(&["a".to_string()]).await.unwrap();
        assert_eq!(by_id[0].nl_summary(), Some("adds two numbers"));
    }

    #[tokio::test]
    async fn query_applies_repository_filter() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        store
            .upsert(
                &["a".to_string(), "b".to_string()],
                &[vec![1.0, 0.0], vec![1.0, 0.0]],
                &[chunk("a", "repo1", "a.rs"), chunk("b", "repo2", "b.rs")],
            )
            .await
            .unwrap();

        let filters = VectorQueryFilters {
            repository_ids: Some(vec!["repo1".to_string()]),
            ..Default::default()
        };
        let results = store.query(&[1.0, 0.0], 10, &filters).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn delete_by_file_path_removes_matching_chunks_only() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        store
            .upsert(
                &["a".to_string(), "b".to_string()],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
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
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        store
            .upsert(
                &["a".to_string()],
                &[vec![1.0, 0.0]],
                &[chunk("a", "repo", "a.rs")],
            )
            .await
            .unwrap();

        store.delete_by_repository("repo").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_by_ids_skips_missing_ids() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        store
            .upsert(
                &["a".to_string()],
                &[vec![1.0, 0.0]],
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

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let store = DuckdbVectorRepository::in_memory(2).unwrap();
        let err = store
            .upsert(
                &["a".to_string()],
                &[vec![1.0, 0.0, 0.0]],
                &[chunk("a", "repo", "a.rs")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}
