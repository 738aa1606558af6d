//! Vector index trait for storing and searching chunk embeddings

use async_trait::async_trait;

use crate::error::Result;
use crate::types::DocumentId;

/// A chunk returned from the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Chunk identifier (`"{document_id}_{ordinal}"`)
    pub chunk_id: String,
    /// Owning document
    pub document_id: DocumentId,
    /// Chunk text
    pub content: String,
    /// Cosine similarity to the query (0.0 for non-semantic listings)
    pub score: f32,
}

/// Trait for vector storage and similarity search filtered by document
///
/// Implementations:
/// - `InMemoryIndex`: brute-force cosine search behind a read/write lock
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add one entry per `(text, embedding)` pair; ordinals follow slice order.
    /// Re-adding an existing chunk id overwrites it.
    async fn add(&self, document_id: DocumentId, chunks: Vec<(String, Vec<f32>)>) -> Result<usize>;

    /// Drop every entry of the document and add `chunks` in one step
    async fn replace(&self, document_id: DocumentId, chunks: Vec<(String, Vec<f32>)>) -> Result<usize>;

    /// Up to `k` entries of `candidates`, by descending similarity then chunk id
    async fn query(&self, embedding: &[f32], candidates: &[DocumentId], k: usize) -> Result<Vec<IndexHit>>;

    /// Every entry belonging to `candidates`, ordered by chunk id
    async fn chunks_for(&self, candidates: &[DocumentId]) -> Result<Vec<IndexHit>>;

    /// Remove all entries of a document, returning how many were removed
    async fn delete(&self, document_id: DocumentId) -> Result<usize>;

    /// Total number of entries
    async fn len(&self) -> Result<usize>;

    /// Check if the index is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
