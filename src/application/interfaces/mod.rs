mod embedding_service;
mod llm_client;
mod parser;
mod reranking_service;
mod vector_store;
mod work_item_provider;

pub use embedding_service::*;
pub use llm_client::*;
pub use parser::*;
pub use reranking_service::*;
pub use vector_store::*;
pub use work_item_provider::*;
