//! Error types for the query engine

use thiserror::Error;

use crate::types::DocumentId;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Query engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (no usable backend, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Index or embedding service could not serve a search
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// A candidate filter surfaced a chunk outside the authorized document set
    #[error("Isolation violation: chunk '{chunk_id}' belongs to document {document_id} outside the candidate set")]
    IsolationViolation {
        chunk_id: String,
        document_id: DocumentId,
    },

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorDb(String),

    /// Language model backend error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Relevance scoring error
    #[error("Reranker error: {0}")]
    Rerank(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// Invalid chunking parameters
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector index error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error means the search backend is down rather than
    /// the query being wrong. The retriever retries these once.
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::VectorDb(_) | Self::Http(_) | Self::RetrievalUnavailable(_)
        )
    }
}
