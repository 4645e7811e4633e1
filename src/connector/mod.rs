//! # Connector Layer
//!
//! Concrete adapters implementing the `application::interfaces` ports:
//! embedding providers, an LLM client, vector stores, a reranking service,
//! and the tree-sitter-backed parser.

pub mod adapter;

pub use adapter::*;
