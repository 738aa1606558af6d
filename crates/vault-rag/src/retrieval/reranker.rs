//! Relevance reranking of the retrieval pool
//!
//! A `RelevanceScorer` scores every `(question, chunk)` pair; the pool is
//! stable-sorted by that score and cut to the final `k`. If scoring fails
//! the pool keeps its retrieval order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{RerankConfig, RerankScorer};
use crate::error::{Error, Result};

use super::keyword::tokenize;
use super::retriever::RetrievedChunk;

/// Scores texts by relevance to a question
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per text, same order; higher is more relevant
    async fn score(&self, question: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// Local token-overlap scorer with a bigram bonus
#[derive(Debug, Clone, Default)]
pub struct LexicalScorer;

fn bigrams(tokens: &[String]) -> HashSet<(String, String)> {
    tokens
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect()
}

impl LexicalScorer {
    fn score_one(query_tokens: &HashSet<String>, query_bigrams: &HashSet<(String, String)>, text: &str) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let tokens = tokenize(text);
        let token_set: HashSet<String> = tokens.iter().cloned().collect();
        let unigram = query_tokens.intersection(&token_set).count() as f32 / query_tokens.len() as f32;

        if query_bigrams.is_empty() {
            return unigram;
        }
        let text_bigrams = bigrams(&tokens);
        let bigram = query_bigrams.intersection(&text_bigrams).count() as f32 / query_bigrams.len() as f32;
        unigram + 0.5 * bigram
    }
}

#[async_trait]
impl RelevanceScorer for LexicalScorer {
    async fn score(&self, question: &str, texts: &[String]) -> Result<Vec<f32>> {
        let tokens = tokenize(question);
        let query_bigrams = bigrams(&tokens);
        let query_tokens: HashSet<String> = tokens.into_iter().collect();

        Ok(texts
            .iter()
            .map(|text| Self::score_one(&query_tokens, &query_bigrams, text))
            .collect())
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    score: f32,
}

/// Client for a cross-encoder service exposing `POST /rerank`
/// (text-embeddings-inference compatible)
pub struct CrossEncoderClient {
    client: Client,
    endpoint: String,
}

impl CrossEncoderClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderClient {
    async fn score(&self, question: &str, texts: &[String]) -> Result<Vec<f32>> {
        let url = format!("{}/rerank", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                query: question,
                texts,
                truncate: true,
            })
            .send()
            .await
            .map_err(|e| Error::Rerank(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Rerank(format!("HTTP {}", response.status())));
        }

        let results: Vec<RerankResult> = response
            .json()
            .await
            .map_err(|e| Error::Rerank(format!("failed to parse response: {}", e)))?;

        let mut scores: Vec<Option<f32>> = vec![None; texts.len()];
        for result in results {
            match scores.get_mut(result.index) {
                Some(slot) => *slot = Some(result.score),
                None => {
                    return Err(Error::Rerank(format!(
                        "score for index {} but only {} texts were sent",
                        result.index,
                        texts.len()
                    )))
                }
            }
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| Error::Rerank(format!("no score for text {}", i))))
            .collect()
    }
}

/// Reorders a candidate pool by relevance
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Build the configured scorer
    pub fn from_config(config: &RerankConfig) -> Result<Self> {
        let scorer: Arc<dyn RelevanceScorer> = match config.scorer {
            RerankScorer::Lexical => Arc::new(LexicalScorer),
            RerankScorer::CrossEncoder => {
                tracing::info!(
                    "Using cross-encoder reranker {} at {}",
                    config.model,
                    config.endpoint
                );
                Arc::new(CrossEncoderClient::new(
                    &config.endpoint,
                    Duration::from_secs(config.timeout_secs),
                )?)
            }
        };
        Ok(Self::new(scorer))
    }

    /// Top `k` candidates by descending relevance; equal scores keep pool order
    pub async fn rerank(
        &self,
        question: &str,
        mut candidates: Vec<RetrievedChunk>,
        k: usize,
    ) -> Vec<RetrievedChunk> {
        if candidates.is_empty() || k == 0 {
            return Vec::new();
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        match self.scorer.score(question, &texts).await {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.score = score;
                }
                candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
            }
            Ok(scores) => {
                tracing::warn!(
                    "Reranker returned {} scores for {} candidates, keeping retrieval order",
                    scores.len(),
                    candidates.len()
                );
            }
            Err(e) => {
                tracing::warn!("Reranker failed, keeping retrieval order: {}", e);
            }
        }

        candidates.truncate(k);
        candidates
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(Arc::new(LexicalScorer))
    }
}
