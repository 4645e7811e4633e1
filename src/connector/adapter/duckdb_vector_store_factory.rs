use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::Connection;
use tokio::sync::Mutex;

use crate::application::{VectorStore, VectorStoreFactory};
use crate::domain::DomainError;

use super::duckdb_vector_repository::DuckdbVectorRepository;

/// Mints one [`DuckdbVectorRepository`] per namespace, all sharing a single
/// open connection to one `vectors.duckdb` file — a second `Connection::open`
/// on the same file would conflict with the first, so every namespace (each
/// repository plus the root merge) is a separate DuckDB schema on the one
/// connection rather than a separate file.
pub struct DuckdbVectorStoreFactory {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl DuckdbVectorStoreFactory {
    pub fn open_file(path: &PathBuf, dimensions: usize) -> Result<Self, DomainError> {
        let bootstrap = DuckdbVectorRepository::new_with_namespace(path, "main", dimensions)?;
        Ok(Self {
            conn: bootstrap.shared_connection(),
            dimensions,
        })
    }
}

#[async_trait]
impl VectorStoreFactory for DuckdbVectorStoreFactory {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn VectorStore>, DomainError> {
        let store =
            DuckdbVectorRepository::from_shared_connection(self.conn.clone(), namespace, self.dimensions).await?;
        Ok(Arc::new(store))
    }
}
