//! Core types for the query engine

pub mod backend;
pub mod document;
pub mod query;

pub use backend::{BackendConfigId, BackendKind, ChatApi, LlmBackendConfig};
pub use document::{CategoryId, Chunk, Document, DocumentId, OwnerId};
pub use query::{QueryRecord, QueryRequest, QueryResponse, QueryScope, Turn};
