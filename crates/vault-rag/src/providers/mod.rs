//! Collaborator abstractions for embeddings, vector indexing, document
//! storage, backend configuration, auditing and expiry notification
//!
//! Every seam is an `async_trait` so the engine can run against local
//! implementations here or against services supplied by the host application.

pub mod audit;
pub mod config_store;
pub mod document_store;
pub mod embedding;
pub mod hashing;
pub mod local;
pub mod ollama;
pub mod vector_store;

pub use audit::{AuditSink, ExpiryNotifier};
pub use config_store::BackendConfigStore;
pub use document_store::DocumentStore;
pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use local::{LocalDocumentStore, StaticBackendConfigs, TracingAuditSink, TracingNotifier};
pub use ollama::{OllamaClient, OllamaEmbedder};
pub use vector_store::{IndexHit, VectorIndex};

#[cfg(test)]
pub use audit::{MockAuditSink, MockExpiryNotifier};
#[cfg(test)]
pub use config_store::MockBackendConfigStore;
#[cfg(test)]
pub use document_store::MockDocumentStore;
#[cfg(test)]
pub use vector_store::MockVectorIndex;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::Result;

/// Build the embedding provider selected in configuration
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)?),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::from_config(config)?),
    })
}
