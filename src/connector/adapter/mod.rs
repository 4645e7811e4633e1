mod anthropic_client;
mod duckdb_vector_repository;
mod duckdb_vector_store_factory;
mod in_memory_vector_repository;
mod llm_reranking;
mod mock_embedding;
mod mock_llm_client;
mod mock_reranking;
mod mock_work_item_provider;
mod ort_embedding;
mod ort_reranking;
mod treesitter_parser;

pub use anthropic_client::*;
pub use duckdb_vector_repository::*;
pub use duckdb_vector_store_factory::*;
pub use in_memory_vector_repository::*;
pub use llm_reranking::*;
pub use mock_embedding::*;
pub use mock_llm_client::*;
pub use mock_reranking::*;
pub use mock_work_item_provider::*;
pub use ort_embedding::*;
pub use ort_reranking::*;
pub use treesitter_parser::*;
