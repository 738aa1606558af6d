//! In-memory vector index with per-document filtering and JSON snapshots

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::providers::{IndexHit, VectorIndex};
use crate::types::{Chunk, DocumentId};

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Default)]
struct IndexState {
    chunks: HashMap<String, Chunk>,
    /// Mapping from document IDs to chunk IDs for deletion
    document_chunks: HashMap<DocumentId, Vec<String>>,
}

impl IndexState {
    fn insert(&mut self, chunk: Chunk) {
        let ids = self.document_chunks.entry(chunk.document_id).or_default();
        if !ids.contains(&chunk.id) {
            ids.push(chunk.id.clone());
        }
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    fn remove_document(&mut self, document_id: DocumentId) -> usize {
        let Some(ids) = self.document_chunks.remove(&document_id) else {
            return 0;
        };
        ids.iter()
            .filter(|id| self.chunks.remove(id.as_str()).is_some())
            .count()
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    dimensions: usize,
    chunks: Vec<Chunk>,
}

/// Brute-force cosine index guarded by a read/write lock.
///
/// Readers run concurrently; `add`, `replace` and `delete` take the write
/// lock, so a document's entries always change as a set.
pub struct InMemoryIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    /// Create an empty index for vectors of `dimensions`
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Vector dimensions accepted by this index
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn build_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<(String, Vec<f32>)>,
    ) -> Result<Vec<Chunk>> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, (content, embedding))| {
                if embedding.len() != self.dimensions {
                    return Err(Error::vector_db(format!(
                        "chunk {} of document {} has {} dimensions, index expects {}",
                        ordinal,
                        document_id,
                        embedding.len(),
                        self.dimensions
                    )));
                }
                Ok(Chunk::new(document_id, ordinal as u32, content, embedding))
            })
            .collect()
    }

    /// Write a JSON snapshot, replacing `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let state = self.state.read();
            let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
            chunks.sort_by(|a, b| a.id.cmp(&b.id));
            IndexSnapshot {
                dimensions: self.dimensions,
                chunks,
            }
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &snapshot)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} chunks to {}", snapshot.chunks.len(), path.display());
        Ok(())
    }

    /// Restore an index from a snapshot; a missing file yields an empty index
    pub fn load(path: &Path, dimensions: usize) -> Result<Self> {
        let index = Self::new(dimensions);
        if !path.exists() {
            return Ok(index);
        }

        let content = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&content)?;
        if snapshot.dimensions != dimensions {
            return Err(Error::config(format!(
                "index snapshot {} has {} dimensions, configured embeddings have {}",
                path.display(),
                snapshot.dimensions,
                dimensions
            )));
        }

        {
            let mut state = index.state.write();
            for chunk in snapshot.chunks {
                state.insert(chunk);
            }
        }
        tracing::info!("Loaded {} chunks from {}", index.state.read().chunks.len(), path.display());
        Ok(index)
    }
}

fn to_hit(chunk: &Chunk, score: f32) -> IndexHit {
    IndexHit {
        chunk_id: chunk.id.clone(),
        document_id: chunk.document_id,
        content: chunk.content.clone(),
        score,
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, document_id: DocumentId, chunks: Vec<(String, Vec<f32>)>) -> Result<usize> {
        let chunks = self.build_chunks(document_id, chunks)?;
        let count = chunks.len();

        let mut state = self.state.write();
        for chunk in chunks {
            state.insert(chunk);
        }
        Ok(count)
    }

    async fn replace(&self, document_id: DocumentId, chunks: Vec<(String, Vec<f32>)>) -> Result<usize> {
        let chunks = self.build_chunks(document_id, chunks)?;
        let count = chunks.len();

        let mut state = self.state.write();
        let removed = state.remove_document(document_id);
        for chunk in chunks {
            state.insert(chunk);
        }
        tracing::debug!(
            "Replaced {} chunks of document {} with {}",
            removed,
            document_id,
            count
        );
        Ok(count)
    }

    async fn query(&self, embedding: &[f32], candidates: &[DocumentId], k: usize) -> Result<Vec<IndexHit>> {
        if embedding.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "query has {} dimensions, index expects {}",
                embedding.len(),
                self.dimensions
            )));
        }
        if candidates.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let allowed: HashSet<DocumentId> = candidates.iter().copied().collect();
        let state = self.state.read();
        let mut hits: Vec<IndexHit> = allowed
            .iter()
            .filter_map(|id| state.document_chunks.get(id))
            .flatten()
            .filter_map(|chunk_id| state.chunks.get(chunk_id))
            .map(|chunk| to_hit(chunk, cosine_similarity(embedding, &chunk.embedding)))
            .collect();
        drop(state);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn chunks_for(&self, candidates: &[DocumentId]) -> Result<Vec<IndexHit>> {
        let allowed: HashSet<DocumentId> = candidates.iter().copied().collect();
        let state = self.state.read();
        let mut hits: Vec<IndexHit> = allowed
            .iter()
            .filter_map(|id| state.document_chunks.get(id))
            .flatten()
            .filter_map(|chunk_id| state.chunks.get(chunk_id))
            .map(|chunk| to_hit(chunk, 0.0))
            .collect();
        drop(state);

        hits.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(hits)
    }

    async fn delete(&self, document_id: DocumentId) -> Result<usize> {
        let removed = self.state.write().remove_document(document_id);
        if removed > 0 {
            tracing::debug!("Deleted {} chunks of document {}", removed, document_id);
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().chunks.len())
    }
}
