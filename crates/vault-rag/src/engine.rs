//! The query engine boundary: `ingest`, `query` and `forget`
//!
//! `RagEngine` is cheap to clone; every clone shares the same index,
//! conversation store and collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::RagConfig;
use crate::conversation::{ConversationStore, MemoryConversationStore};
use crate::error::{Error, Result};
use crate::generation::{AnswerGenerator, BackendSet};
use crate::ingestion::TextChunker;
use crate::lifecycle::{DocumentLocks, LifecycleHandle, LifecycleManager};
use crate::providers::{
    embedder_from_config, AuditSink, BackendConfigStore, DocumentStore, EmbeddingProvider,
    ExpiryNotifier, StaticBackendConfigs, TracingAuditSink, TracingNotifier, VectorIndex,
};
use crate::retrieval::{InMemoryIndex, Reranker, Retriever};
use crate::types::{
    BackendConfigId, DocumentId, LlmBackendConfig, QueryRecord, QueryRequest, QueryResponse,
    QueryScope, Turn,
};

/// Document id used for content indexed only for the duration of one request
const TRANSIENT_DOCUMENT_ID: DocumentId = 0;

struct EngineInner {
    config: RagConfig,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    reranker: Reranker,
    conversations: Arc<dyn ConversationStore>,
    generator: AnswerGenerator,
    documents: Arc<dyn DocumentStore>,
    backend_configs: Arc<dyn BackendConfigStore>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn ExpiryNotifier>,
    locks: Arc<DocumentLocks>,
}

/// Retrieval-augmented query engine over a private document collection
#[derive(Clone)]
pub struct RagEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`RagEngine`]; unset collaborators get local defaults
pub struct RagEngineBuilder {
    config: RagConfig,
    documents: Option<Arc<dyn DocumentStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    backend_configs: Option<Arc<dyn BackendConfigStore>>,
    backends: Option<BackendSet>,
    reranker: Option<Reranker>,
    conversations: Option<Arc<dyn ConversationStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    notifier: Option<Arc<dyn ExpiryNotifier>>,
}

impl RagEngineBuilder {
    /// Document store used for scopes, `ingest_from_store` and the lifecycle sweep (required)
    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn backend_configs(mut self, configs: Arc<dyn BackendConfigStore>) -> Self {
        self.backend_configs = Some(configs);
        self
    }

    pub fn backends(mut self, backends: BackendSet) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn conversations(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ExpiryNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<RagEngine> {
        let config = self.config;
        config.validate()?;

        let documents = self
            .documents
            .ok_or_else(|| Error::config("a document store is required"))?;
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedder_from_config(&config.embeddings)?,
        };
        let index = self
            .index
            .unwrap_or_else(|| Arc::new(InMemoryIndex::new(config.embeddings.dimensions)));
        let backend_configs = match self.backend_configs {
            Some(configs) => configs,
            None => Arc::new(StaticBackendConfigs::from_configs(config.backends.clone())?),
        };
        let backends = match self.backends {
            Some(backends) => backends,
            None => BackendSet::new(Duration::from_secs(config.generation.timeout_secs))?,
        };
        let reranker = match self.reranker {
            Some(reranker) => reranker,
            None => Reranker::from_config(&config.rerank)?,
        };
        let conversations = self
            .conversations
            .unwrap_or_else(|| Arc::new(MemoryConversationStore::new(&config.conversation)));

        tracing::info!(
            "Query engine ready: embedder {} ({} dims), top_k {}",
            embedder.name(),
            embedder.dimensions(),
            config.retrieval.top_k
        );

        Ok(RagEngine {
            inner: Arc::new(EngineInner {
                chunker: TextChunker::from_config(&config.chunking)?,
                retriever: Retriever::new(embedder.clone(), index.clone(), config.retrieval.clone()),
                generator: AnswerGenerator::new(backends, &config.generation),
                embedder,
                index,
                reranker,
                conversations,
                documents,
                backend_configs,
                audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                locks: Arc::new(DocumentLocks::new()),
                config,
            }),
        })
    }
}

impl RagEngine {
    pub fn builder(config: RagConfig) -> RagEngineBuilder {
        RagEngineBuilder {
            config,
            documents: None,
            embedder: None,
            index: None,
            backend_configs: None,
            backends: None,
            reranker: None,
            conversations: None,
            audit: None,
            notifier: None,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.inner.index
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.inner.conversations
    }

    /// Chunk, embed and index a document's text, replacing any earlier version.
    ///
    /// All chunks are embedded before the index is touched, so a failure
    /// leaves the previous version in place. Returns the number of chunks.
    pub async fn ingest(&self, document_id: DocumentId, text: &str) -> Result<usize> {
        let _guard = self.inner.locks.lock(document_id).await;
        self.ingest_locked(document_id, text).await
    }

    /// Ingest a document's text fetched from the document store.
    ///
    /// The text is read under the document's lock, so a document removed by
    /// a concurrent sweep fails with `DocumentNotFound` instead of being
    /// indexed again.
    pub async fn ingest_from_store(&self, document_id: DocumentId) -> Result<usize> {
        let _guard = self.inner.locks.lock(document_id).await;
        let text = self.inner.documents.get_text(document_id).await?;
        self.ingest_locked(document_id, &text).await
    }

    /// Caller holds the document's lock
    async fn ingest_locked(&self, document_id: DocumentId, text: &str) -> Result<usize> {
        let inner = &self.inner;
        let chunks = inner.chunker.split(text);

        if chunks.is_empty() {
            let removed = inner.index.delete(document_id).await?;
            tracing::info!(
                "Document {} has no text to index ({} stale chunks removed)",
                document_id,
                removed
            );
            return Ok(0);
        }

        let embeddings = self.embed_chunks(&chunks).await?;
        let entries: Vec<(String, Vec<f32>)> = chunks.into_iter().zip(embeddings).collect();
        let count = inner.index.replace(document_id, entries).await?;
        tracing::info!("Indexed document {} as {} chunks", document_id, count);
        Ok(count)
    }

    /// One embedding per chunk, or an error
    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = &self.inner.embedder;
        let embeddings = embedder.embed_batch(chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::embedding(format!(
                "{} returned {} embeddings for {} chunks",
                embedder.name(),
                embeddings.len(),
                chunks.len()
            )));
        }
        Ok(embeddings)
    }

    /// Remove a document's chunks from the index, returning how many were removed
    pub async fn forget(&self, document_id: DocumentId) -> Result<usize> {
        let removed = {
            let _guard = self.inner.locks.lock(document_id).await;
            self.inner.index.delete(document_id).await?
        };
        self.inner.locks.prune();
        tracing::info!("Forgot document {} ({} chunks)", document_id, removed);
        Ok(removed)
    }

    /// Answer a question from the documents in the request's scope
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let inner = &self.inner;
        let top_k = inner.config.retrieval.top_k;

        let backend = self.resolve_backend(request.backend_config_id).await?;
        let candidates = self.resolve_scope(&request.scope).await?;
        let conversation_id = request
            .conversation_id
            .unwrap_or_else(|| inner.conversations.new_id());

        let (pool, history) = futures::future::try_join(
            inner.retriever.retrieve(&request.question, &candidates, top_k),
            inner.conversations.history(&conversation_id),
        )
        .await?;
        let ranked = inner.reranker.rerank(&request.question, pool, top_k).await;
        let context: Vec<String> = ranked.into_iter().map(|chunk| chunk.content).collect();

        tracing::info!(
            "Query over {} documents: {} context chunks",
            candidates.len(),
            context.len()
        );

        self.answer_and_record(
            request.question,
            conversation_id,
            candidates,
            context,
            history,
            &backend,
            started,
        )
        .await
    }

    /// Answer a question over content supplied with the request.
    ///
    /// The content is chunked into a throwaway index for this call only;
    /// nothing is cached or written to the shared index.
    pub async fn query_content(
        &self,
        question: &str,
        content: &str,
        conversation_id: Option<String>,
        backend_config_id: Option<BackendConfigId>,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let inner = &self.inner;
        let top_k = inner.config.retrieval.top_k;

        let backend = self.resolve_backend(backend_config_id).await?;
        let conversation_id = conversation_id.unwrap_or_else(|| inner.conversations.new_id());

        let chunks = inner.chunker.split(content);
        let context = if chunks.is_empty() {
            Vec::new()
        } else {
            let embeddings = inner
                .retriever
                .with_retry("content embedding", || self.embed_chunks(&chunks))
                .await?;
            let transient = Arc::new(InMemoryIndex::new(inner.embedder.dimensions()));
            transient
                .add(TRANSIENT_DOCUMENT_ID, chunks.into_iter().zip(embeddings).collect())
                .await?;

            let retriever = Retriever::new(
                inner.embedder.clone(),
                transient,
                inner.config.retrieval.clone(),
            );
            let pool = retriever
                .retrieve(question, &[TRANSIENT_DOCUMENT_ID], top_k)
                .await?;
            inner
                .reranker
                .rerank(question, pool, top_k)
                .await
                .into_iter()
                .map(|chunk| chunk.content)
                .collect()
        };
        let history = inner.conversations.history(&conversation_id).await?;

        self.answer_and_record(
            question.to_string(),
            conversation_id,
            Vec::new(),
            context,
            history,
            &backend,
            started,
        )
        .await
    }

    /// Build a lifecycle manager sharing this engine's index and document locks
    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        let inner = &self.inner;
        Arc::new(LifecycleManager::new(
            inner.documents.clone(),
            inner.index.clone(),
            inner.notifier.clone(),
            inner.locks.clone(),
            inner.config.lifecycle.clone(),
        ))
    }

    /// Spawn the background expiry worker, unless disabled in configuration
    pub fn start_lifecycle(&self) -> Option<LifecycleHandle> {
        if !self.inner.config.lifecycle.enabled {
            tracing::info!("Lifecycle worker disabled by configuration");
            return None;
        }
        Some(self.lifecycle().spawn())
    }

    /// Configuration by id, falling back to the default configuration
    async fn resolve_backend(&self, id: Option<BackendConfigId>) -> Result<LlmBackendConfig> {
        let configs = &self.inner.backend_configs;
        if let Some(id) = id {
            if let Some(config) = configs.get(id).await? {
                return Ok(config);
            }
            tracing::warn!("Backend configuration {} not found, using the default", id);
        }
        configs
            .default_config()
            .await?
            .ok_or_else(|| Error::config("No LLM configuration found"))
    }

    /// Candidate document ids for a scope, sorted and deduplicated
    async fn resolve_scope(&self, scope: &QueryScope) -> Result<Vec<DocumentId>> {
        let documents = &self.inner.documents;
        let mut ids = match scope {
            QueryScope::Documents(ids) => ids.clone(),
            QueryScope::Category(category_id) => documents.list_ids_for_category(*category_id).await?,
            QueryScope::Owner(owner_id) => documents.list_ids_for_owner(*owner_id).await?,
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Generate the answer, then record the turn and the audit record
    #[allow(clippy::too_many_arguments)]
    async fn answer_and_record(
        &self,
        question: String,
        conversation_id: String,
        queried_document_ids: Vec<DocumentId>,
        context: Vec<String>,
        history: Vec<Turn>,
        backend: &LlmBackendConfig,
        started: Instant,
    ) -> Result<QueryResponse> {
        let inner = &self.inner;
        let answer = inner
            .generator
            .answer(&question, &context, &history, backend)
            .await;

        inner
            .conversations
            .append(&conversation_id, &question, &answer)
            .await?;

        let record = QueryRecord {
            question,
            answer: answer.clone(),
            queried_document_ids: queried_document_ids.clone(),
            conversation_id: conversation_id.clone(),
            backend: backend.name.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = inner.audit.record(record).await {
            tracing::warn!("Failed to record query audit entry: {}", e);
        }

        Ok(QueryResponse {
            answer,
            conversation_id,
            queried_document_ids,
            context,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::backends::MockLlmBackend;
    use crate::providers::{HashingEmbedder, MockAuditSink, MockBackendConfigStore, MockDocumentStore};
    use crate::types::BackendKind;

    /// Drops the last embedding of every batch
    struct ShortBatchEmbedder(HashingEmbedder);

    #[async_trait::async_trait]
    impl EmbeddingProvider for ShortBatchEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut embeddings = self.0.embed_batch(texts).await?;
            embeddings.pop();
            Ok(embeddings)
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions()
        }

        fn name(&self) -> &str {
            "short-batch"
        }
    }

    fn test_config() -> RagConfig {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 128;
        config.retrieval.retry_backoff_ms = 1;
        config.backends = vec![LlmBackendConfig::new(1, "local", BackendKind::Local).as_default()];
        config
    }

    fn echo_backend() -> BackendSet {
        let mut backend = MockLlmBackend::new();
        backend
            .expect_generate()
            .returning(|_, config| Ok(format!("answered by {}", config.name)));
        BackendSet::uniform(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_builder_requires_document_store() {
        let result = RagEngine::builder(test_config()).backends(echo_backend()).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_category_scope_resolved_through_store() {
        let mut documents = MockDocumentStore::new();
        documents
            .expect_list_ids_for_category()
            .withf(|id| *id == 4)
            .times(1)
            .returning(|_| Ok(vec![2, 1, 2]));

        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(documents))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .build()
            .unwrap();

        let response = engine
            .query(QueryRequest::scoped("anything", QueryScope::Category(4)))
            .await
            .unwrap();
        assert_eq!(response.queried_document_ids, vec![1, 2]);
        assert_eq!(response.answer, "answered by local");
    }

    #[tokio::test]
    async fn test_unknown_backend_falls_back_to_default() {
        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .build()
            .unwrap();

        let response = engine
            .query(QueryRequest::new("q", vec![]).with_backend(99))
            .await
            .unwrap();
        assert_eq!(response.answer, "answered by local");
    }

    #[tokio::test]
    async fn test_no_backend_configuration_is_config_error() {
        let mut configs = MockBackendConfigStore::new();
        configs.expect_get().returning(|_| Ok(None));
        configs.expect_default_config().returning(|| Ok(None));

        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backend_configs(Arc::new(configs))
            .backends(echo_backend())
            .build()
            .unwrap();

        let err = engine.query(QueryRequest::new("q", vec![1])).await.unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg == "No LLM configuration found"));
        // Nothing was recorded for the failed query
        assert!(engine.conversations().history("any").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_query() {
        let mut audit = MockAuditSink::new();
        audit
            .expect_record()
            .times(1)
            .returning(|_| Err(Error::internal("audit store offline")));

        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .audit(Arc::new(audit))
            .build()
            .unwrap();

        let response = engine.query(QueryRequest::new("q", vec![1])).await.unwrap();
        assert_eq!(response.answer, "answered by local");
    }

    #[tokio::test]
    async fn test_query_content_leaves_shared_index_untouched() {
        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .build()
            .unwrap();

        let response = engine
            .query_content("What color is the sky?", "The sky is blue.", None, None)
            .await
            .unwrap();

        assert_eq!(response.context, vec!["The sky is blue.".to_string()]);
        assert!(response.queried_document_ids.is_empty());
        assert!(engine.index().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_short_embedding_batch_fails_content_query() {
        let mut audit = MockAuditSink::new();
        audit.expect_record().never();

        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(ShortBatchEmbedder(HashingEmbedder::new(128).unwrap())))
            .backends(echo_backend())
            .audit(Arc::new(audit))
            .build()
            .unwrap();

        let err = engine
            .query_content("What color is the sky?", "The sky is blue.", Some("c".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetrievalUnavailable(_)));
        assert!(engine.conversations().history("c").await.unwrap().is_empty());

        let err = engine.ingest(1, "The sky is blue.").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(engine.index().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_lifecycle_worker_respects_enabled_flag() {
        let mut config = test_config();
        config.lifecycle.enabled = false;
        let engine = RagEngine::builder(config)
            .documents(Arc::new(MockDocumentStore::new()))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .build()
            .unwrap();
        assert!(engine.start_lifecycle().is_none());

        let mut documents = MockDocumentStore::new();
        documents.expect_list_expiring().returning(|_| Ok(Vec::new()));
        documents
            .expect_list_expired()
            .times(1..)
            .returning(|_| Ok(Vec::new()));
        let engine = RagEngine::builder(test_config())
            .documents(Arc::new(documents))
            .embedder(Arc::new(HashingEmbedder::new(128).unwrap()))
            .backends(echo_backend())
            .build()
            .unwrap();

        let handle = engine.start_lifecycle().expect("worker enabled by default");
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await.unwrap();
    }
}
