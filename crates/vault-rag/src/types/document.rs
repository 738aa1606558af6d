//! Document and chunk types with lifecycle tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document identifier assigned by the document store
pub type DocumentId = i64;

/// Owning user identifier
pub type OwnerId = i64;

/// Category identifier
pub type CategoryId = i64;

/// Document metadata as held by the document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique document ID
    pub id: DocumentId,
    /// Owning user
    pub owner_id: OwnerId,
    /// Original filename as uploaded by user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Categories this document belongs to
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    /// Size of the raw content in bytes
    pub size: u64,
    /// When the document was stored
    pub created_at: DateTime<Utc>,
    /// When the document stops being queryable
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Create a non-expiring document
    pub fn new(id: DocumentId, owner_id: OwnerId, size: u64) -> Self {
        Self {
            id,
            owner_id,
            filename: None,
            category_ids: Vec::new(),
            size,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Set the original filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the expiry timestamp
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Add the document to a category
    pub fn in_category(mut self, category_id: CategoryId) -> Self {
        if !self.category_ids.contains(&category_id) {
            self.category_ids.push(category_id);
        }
        self
    }

    /// Whether the document has reached its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether the document expires at or before `deadline`
    pub fn expires_by(&self, deadline: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= deadline)
    }

    /// Name used in notifications and logs
    pub fn display_name(&self) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| format!("document {}", self.id))
    }
}

/// A chunk of text from a document, the unit of embedding and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `"{document_id}_{ordinal}"`, unique within the index
    pub id: String,
    /// Parent document ID (the isolation key)
    pub document_id: DocumentId,
    /// Position of the chunk within its document
    pub ordinal: u32,
    /// Text content
    pub content: String,
    /// Embedding vector
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(document_id: DocumentId, ordinal: u32, content: String, embedding: Vec<f32>) -> Self {
        Self {
            id: Self::chunk_id(document_id, ordinal),
            document_id,
            ordinal,
            content,
            embedding,
        }
    }

    /// Build the index identifier for a document's nth chunk
    pub fn chunk_id(document_id: DocumentId, ordinal: u32) -> String {
        format!("{}_{}", document_id, ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_chunk_id_format() {
        let chunk = Chunk::new(42, 3, "text".to_string(), vec![0.1]);
        assert_eq!(chunk.id, "42_3");
        assert_eq!(Chunk::chunk_id(1, 0), "1_0");
    }

    #[test]
    fn test_expiry_boundaries() {
        let now = Utc::now();
        let doc = Document::new(1, 7, 10).with_expiry(now);

        assert!(doc.is_expired(now));
        assert!(!doc.is_expired(now - Duration::seconds(1)));
        assert!(doc.expires_by(now));
        assert!(!doc.expires_by(now - Duration::hours(1)));

        let forever = Document::new(2, 7, 10);
        assert!(!forever.is_expired(now + Duration::days(10_000)));
        assert!(!forever.expires_by(now + Duration::days(10_000)));
    }
}
