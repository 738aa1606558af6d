//! Retrieval: vector index, hybrid search and reranking

pub mod index;
pub mod keyword;
pub mod reranker;
pub mod retriever;

pub use index::{cosine_similarity, InMemoryIndex};
pub use reranker::{CrossEncoderClient, LexicalScorer, RelevanceScorer, Reranker};
pub use retriever::{RetrievalSource, RetrievedChunk, Retriever};
