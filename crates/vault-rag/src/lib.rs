//! vault-rag: retrieval-augmented question answering over private document collections
//!
//! Documents are split into overlapping chunks, embedded and kept in a vector
//! index filtered by document id. A query retrieves candidates from the
//! caller's authorized documents only (semantic search pooled with keyword
//! matches), reranks them, and asks a configurable language model backend
//! for an answer that takes the conversation so far into account. A
//! lifecycle worker removes documents once they expire.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod lifecycle;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use engine::{RagEngine, RagEngineBuilder};
pub use error::{Error, Result};
pub use types::{
    BackendKind, Chunk, Document, DocumentId, LlmBackendConfig, QueryRecord, QueryRequest,
    QueryResponse, QueryScope, Turn,
};
