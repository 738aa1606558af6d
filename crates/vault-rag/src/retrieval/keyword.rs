//! Token-overlap keyword scoring, the lexical leg of hybrid retrieval

use std::collections::HashSet;

use crate::providers::IndexHit;

/// Words too common to say anything about relevance
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my",
    "no", "not", "of", "on", "or", "our", "so", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

/// Lower-cased alphanumeric tokens with stopwords removed, in text order
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Distinct tokens of `text`
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Score `chunks` by the share of distinct query tokens they contain.
///
/// Chunks matching no query token are dropped. Results are ordered by
/// descending score, ties by chunk id, and truncated to `limit`.
pub fn keyword_search(question: &str, chunks: Vec<IndexHit>, limit: usize) -> Vec<IndexHit> {
    let query_tokens = token_set(question);
    if query_tokens.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<IndexHit> = chunks
        .into_iter()
        .filter_map(|mut hit| {
            let chunk_tokens = token_set(&hit.content);
            let matched = query_tokens.intersection(&chunk_tokens).count();
            if matched == 0 {
                return None;
            }
            hit.score = matched as f32 / query_tokens.len() as f32;
            Some(hit)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(limit);
    scored
}
