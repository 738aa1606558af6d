//! Local provider implementations backed by the filesystem and process memory

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{
    BackendConfigId, CategoryId, Document, DocumentId, LlmBackendConfig, OwnerId, QueryRecord,
};

use super::audit::{AuditSink, ExpiryNotifier};
use super::config_store::BackendConfigStore;
use super::document_store::DocumentStore;

/// Local document store: a DashMap registry persisted to `documents.json`
/// with each document's text in `texts/{id}.txt`
pub struct LocalDocumentStore {
    /// Directory holding the registry and texts
    storage_dir: PathBuf,
    /// Document registry
    documents: DashMap<DocumentId, Document>,
    /// Serializes registry writes
    save_lock: tokio::sync::Mutex<()>,
}

impl LocalDocumentStore {
    /// Open (or create) a store in `storage_dir`
    pub fn open(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(storage_dir.join("texts"))?;

        let documents = Self::load_documents(&storage_dir.join("documents.json"));
        tracing::info!("Loaded {} documents from registry", documents.len());

        Ok(Self {
            storage_dir,
            documents,
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Load the registry, starting empty if it is missing or unreadable
    fn load_documents(path: &Path) -> DashMap<DocumentId, Document> {
        let documents = DashMap::new();

        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Vec<Document>>(&content) {
                    Ok(docs) => {
                        for doc in docs {
                            documents.insert(doc.id, doc);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse documents.json: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read documents.json: {}", e);
                }
            }
        }

        documents
    }

    /// Persist the registry
    async fn save_documents(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by_key(|d| d.id);

        let content = serde_json::to_string_pretty(&docs)?;
        tokio::fs::write(self.storage_dir.join("documents.json"), content).await?;
        Ok(())
    }

    fn text_path(&self, id: DocumentId) -> PathBuf {
        self.storage_dir.join("texts").join(format!("{}.txt", id))
    }

    /// Store a document and its text, replacing any previous version
    pub async fn insert(&self, document: Document, text: &str) -> Result<()> {
        tokio::fs::write(self.text_path(document.id), text).await?;
        tracing::debug!("Stored document {} ({} bytes)", document.id, text.len());
        self.documents.insert(document.id, document);
        self.save_documents().await
    }

    /// Document metadata by id
    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.get(&id).map(|entry| entry.value().clone())
    }

    /// All documents ordered by id
    pub fn list(&self) -> Vec<Document> {
        self.filtered(|_| true)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn filtered(&self, keep: impl Fn(&Document) -> bool) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by_key(|d| d.id);
        docs
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get_text(&self, id: DocumentId) -> Result<String> {
        if !self.documents.contains_key(&id) {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(tokio::fs::read_to_string(self.text_path(id)).await?)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Document>> {
        Ok(self.filtered(|doc| doc.is_expired(now)))
    }

    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Document>> {
        Ok(self.filtered(|doc| doc.expires_by(before)))
    }

    async fn delete(&self, id: DocumentId) -> Result<bool> {
        let existed = self.documents.remove(&id).is_some();

        let path = self.text_path(id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        if existed {
            self.save_documents().await?;
        }
        Ok(existed)
    }

    async fn list_ids_for_category(&self, category_id: CategoryId) -> Result<Vec<DocumentId>> {
        Ok(self
            .filtered(|doc| doc.category_ids.contains(&category_id))
            .into_iter()
            .map(|doc| doc.id)
            .collect())
    }

    async fn list_ids_for_owner(&self, owner_id: OwnerId) -> Result<Vec<DocumentId>> {
        Ok(self
            .filtered(|doc| doc.owner_id == owner_id)
            .into_iter()
            .map(|doc| doc.id)
            .collect())
    }
}

/// Backend configurations held in memory, at most one of them default
#[derive(Default)]
pub struct StaticBackendConfigs {
    configs: RwLock<HashMap<BackendConfigId, LlmBackendConfig>>,
}

impl StaticBackendConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, validating each entry as `insert` does
    pub fn from_configs(configs: impl IntoIterator<Item = LlmBackendConfig>) -> Result<Self> {
        let store = Self::new();
        for config in configs {
            store.insert(config)?;
        }
        Ok(store)
    }

    /// Add or replace a configuration.
    ///
    /// Rejects a second default and a name already used by another id.
    pub fn insert(&self, config: LlmBackendConfig) -> Result<()> {
        let mut configs = self.configs.write();

        if let Some(other) = configs.values().find(|c| c.id != config.id && c.name == config.name) {
            return Err(Error::config(format!(
                "backend name '{}' already used by configuration {}",
                config.name, other.id
            )));
        }
        if config.is_default {
            if let Some(other) = configs.values().find(|c| c.id != config.id && c.is_default) {
                return Err(Error::config(format!(
                    "configuration '{}' is already the default backend",
                    other.name
                )));
            }
        }

        configs.insert(config.id, config);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

#[async_trait]
impl BackendConfigStore for StaticBackendConfigs {
    async fn get(&self, id: BackendConfigId) -> Result<Option<LlmBackendConfig>> {
        Ok(self.configs.read().get(&id).cloned())
    }

    async fn default_config(&self) -> Result<Option<LlmBackendConfig>> {
        Ok(self.configs.read().values().find(|c| c.is_default).cloned())
    }
}

/// Audit sink that writes query records to the `vault_rag::audit` log target
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: QueryRecord) -> Result<()> {
        tracing::info!(
            target: "vault_rag::audit",
            conversation_id = %record.conversation_id,
            backend = %record.backend,
            documents = ?record.queried_document_ids,
            question_len = record.question.len(),
            answer_len = record.answer.len(),
            "query answered"
        );
        Ok(())
    }
}

/// Expiry notifier that logs a warning for the owner
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ExpiryNotifier for TracingNotifier {
    async fn notify(&self, document: &Document, expires_at: DateTime<Utc>) -> Result<()> {
        tracing::warn!(
            target: "vault_rag::expiry",
            document_id = document.id,
            owner_id = document.owner_id,
            %expires_at,
            "{} expires on {}",
            document.display_name(),
            expires_at.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(())
    }
}
