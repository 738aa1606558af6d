//! Hybrid semantic + keyword retrieval restricted to a candidate document set

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, IndexHit, VectorIndex};
use crate::types::DocumentId;

use super::keyword::keyword_search;

/// Which retrieval leg surfaced a chunk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Semantic,
    Keyword,
}

/// A chunk in the candidate pool
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: DocumentId,
    pub content: String,
    /// Cosine similarity or keyword overlap, depending on `source`
    pub score: f32,
    pub source: RetrievalSource,
}

impl RetrievedChunk {
    fn from_hit(hit: IndexHit, source: RetrievalSource) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            document_id: hit.document_id,
            content: hit.content,
            score: hit.score,
            source,
        }
    }
}

/// Builds the candidate pool for a question
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Pool of up to `k * candidate_multiplier` chunks per leg.
    ///
    /// Semantic hits come first in rank order, followed by keyword hits not
    /// already pooled. Every pooled chunk belongs to `candidates`.
    pub async fn retrieve(
        &self,
        question: &str,
        candidates: &[DocumentId],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if candidates.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let pool_size = self.config.pool_size(k);

        let semantic = self
            .with_retry("semantic search", || async move {
                let embedding = self.embedder.embed(question).await?;
                self.index.query(&embedding, candidates, pool_size).await
            })
            .await?;

        let keyword = if self.config.keyword_fallback {
            let chunks = self
                .with_retry("keyword search", || self.index.chunks_for(candidates))
                .await?;
            keyword_search(question, chunks, pool_size)
        } else {
            Vec::new()
        };

        let mut seen = HashSet::new();
        let pool: Vec<RetrievedChunk> = semantic
            .into_iter()
            .map(|hit| RetrievedChunk::from_hit(hit, RetrievalSource::Semantic))
            .chain(
                keyword
                    .into_iter()
                    .map(|hit| RetrievedChunk::from_hit(hit, RetrievalSource::Keyword)),
            )
            .filter(|chunk| seen.insert(chunk.chunk_id.clone()))
            .collect();

        let allowed: HashSet<DocumentId> = candidates.iter().copied().collect();
        if let Some(leaked) = pool.iter().find(|c| !allowed.contains(&c.document_id)) {
            tracing::error!(
                chunk_id = %leaked.chunk_id,
                document_id = leaked.document_id,
                "Retrieved chunk outside the candidate set"
            );
            return Err(Error::IsolationViolation {
                chunk_id: leaked.chunk_id.clone(),
                document_id: leaked.document_id,
            });
        }

        tracing::debug!(
            "Retrieved {} candidates from {} documents",
            pool.len(),
            candidates.len()
        );
        Ok(pool)
    }

    /// Run `operation`, retrying once after the configured backoff when the
    /// search backend is unavailable
    pub(crate) async fn with_retry<F, Fut, T>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match operation().await {
            Ok(result) => Ok(result),
            Err(e) if e.is_retrieval_failure() => {
                let backoff = Duration::from_millis(self.config.retry_backoff_ms);
                tracing::warn!("{} failed: {}, retrying in {:?}", what, e, backoff);
                tokio::time::sleep(backoff).await;

                operation().await.map_err(|e| {
                    if e.is_retrieval_failure() {
                        Error::RetrievalUnavailable(format!("{}: {}", what, e))
                    } else {
                        e
                    }
                })
            }
            Err(e) => Err(e),
        }
    }
}
