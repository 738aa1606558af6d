//! Document store trait: metadata and raw text owned outside the engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CategoryId, Document, DocumentId, OwnerId};

/// Trait for the store that owns document metadata and text
///
/// Implementations:
/// - `LocalDocumentStore`: DashMap registry persisted to `documents.json`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Raw text of a document
    async fn get_text(&self, id: DocumentId) -> Result<String>;

    /// Documents whose expiry is at or before `now`
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Document>>;

    /// Documents with an expiry at or before `before`
    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Document>>;

    /// Delete a document's metadata and text; `false` if it did not exist
    async fn delete(&self, id: DocumentId) -> Result<bool>;

    /// Documents in a category
    async fn list_ids_for_category(&self, category_id: CategoryId) -> Result<Vec<DocumentId>>;

    /// Documents owned by a user
    async fn list_ids_for_owner(&self, owner_id: OwnerId) -> Result<Vec<DocumentId>>;
}
