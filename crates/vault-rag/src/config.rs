//! Configuration for the query engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::LlmBackendConfig;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reranking configuration
    #[serde(default)]
    pub rerank: RerankConfig,
    /// Answer generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Conversation history configuration
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Document expiry configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// On-disk state for the local stores
    #[serde(default)]
    pub storage: StorageConfig,
    /// Language model backends
    #[serde(default)]
    pub backends: Vec<LlmBackendConfig>,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be positive"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 || self.retrieval.candidate_multiplier == 0 {
            return Err(Error::config(
                "retrieval.top_k and retrieval.candidate_multiplier must be positive",
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embeddings.dimensions must be positive"));
        }
        if self.generation.timeout_secs == 0 {
            return Err(Error::config("generation.timeout_secs must be positive"));
        }

        let defaults = self.backends.iter().filter(|b| b.is_default).count();
        if defaults > 1 {
            return Err(Error::config(format!(
                "{} backends are marked default; at most one may be",
                defaults
            )));
        }

        Ok(())
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Which embedder to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder, no external service
    #[default]
    Hashing,
    /// Ollama embedding model
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedder to use
    #[serde(default)]
    pub backend: EmbeddingBackend,
    /// Embedding dimensions (768 for nomic-embed-text)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Ollama base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Ollama embedding model
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
}

fn default_dimensions() -> usize { 384 }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_embed_model() -> String { "nomic-embed-text".to_string() }
fn default_embed_timeout() -> u64 { 30 }
fn default_embed_retries() -> u32 { 2 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dimensions: default_dimensions(),
            base_url: default_ollama_url(),
            model: default_embed_model(),
            timeout_secs: default_embed_timeout(),
            max_retries: default_embed_retries(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks given to the model
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Over-fetch factor for the candidate pool handed to the reranker
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Pool keyword matches with the semantic results
    #[serde(default = "default_keyword_fallback")]
    pub keyword_fallback: bool,
    /// Delay before the single retry of a failed search
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_top_k() -> usize { 5 }
fn default_candidate_multiplier() -> usize { 4 }
fn default_keyword_fallback() -> bool { true }
fn default_retry_backoff_ms() -> u64 { 250 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            keyword_fallback: default_keyword_fallback(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl RetrievalConfig {
    /// Size of the candidate pool fetched per retrieval leg for `k` results
    pub fn pool_size(&self, k: usize) -> usize {
        k.saturating_mul(self.candidate_multiplier.max(1))
    }
}

/// Which relevance scorer the reranker uses
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RerankScorer {
    /// Local token-overlap scorer
    #[default]
    Lexical,
    /// Remote cross-encoder service
    CrossEncoder,
}

/// Reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Scorer to use
    #[serde(default)]
    pub scorer: RerankScorer,
    /// Cross-encoder service base URL
    #[serde(default = "default_rerank_endpoint")]
    pub endpoint: String,
    /// Cross-encoder model (sent to services hosting several)
    #[serde(default = "default_rerank_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_rerank_timeout")]
    pub timeout_secs: u64,
}

fn default_rerank_endpoint() -> String { "http://localhost:8081".to_string() }
fn default_rerank_model() -> String { "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string() }
fn default_rerank_timeout() -> u64 { 30 }

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            scorer: RerankScorer::default(),
            endpoint: default_rerank_endpoint(),
            model: default_rerank_model(),
            timeout_secs: default_rerank_timeout(),
        }
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound on a single backend call in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_timeout() -> u64 { 60 }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_generation_timeout(),
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Maximum number of live conversations
    #[serde(default = "default_max_conversations")]
    pub max_conversations: u64,
    /// Conversations idle for longer than this are evicted
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    /// Most recent turns kept per conversation; unbounded when absent
    #[serde(default)]
    pub max_turns: Option<usize>,
}

fn default_max_conversations() -> u64 { 10_000 }
fn default_idle_ttl() -> u64 { 3600 }

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            idle_ttl_secs: default_idle_ttl(),
            max_turns: None,
        }
    }
}

/// Document expiry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Run the background expiry worker
    #[serde(default = "default_lifecycle_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Notify owners this many days before expiry
    #[serde(default = "default_warning_days")]
    pub warning_days: i64,
}

fn default_lifecycle_enabled() -> bool { true }
fn default_interval() -> u64 { 3600 }
fn default_warning_days() -> i64 { 7 }

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: default_lifecycle_enabled(),
            interval_secs: default_interval(),
            warning_days: default_warning_days(),
        }
    }
}

/// Storage locations for the local stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the index snapshot and document registry
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
        .join("vault-rag")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Path of the vector index snapshot
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }
}
