//! Recursive text chunking with overlapping windows
//!
//! Text is split on the coarsest separator that yields pieces no larger than
//! the chunk size (paragraphs, then lines, sentences, words and finally single
//! characters). Neighbouring pieces are merged back into windows of at most
//! `chunk_size` characters, each window starting with up to `overlap`
//! characters carried over from the end of the previous one.

use std::collections::VecDeque;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

/// Separator levels, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Paragraph,
    Line,
    Sentence,
    Word,
    Char,
}

impl Separator {
    const HIERARCHY: [Separator; 5] = [
        Separator::Paragraph,
        Separator::Line,
        Separator::Sentence,
        Separator::Word,
        Separator::Char,
    ];

    /// Split `text` at this level. Pieces exclude the separator itself
    /// except for sentences, which keep their trailing whitespace.
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let pieces: Vec<&str> = match self {
            Separator::Paragraph => text.split("\n\n").collect(),
            Separator::Line => text.split('\n').collect(),
            Separator::Sentence => text.split_sentence_bounds().collect(),
            Separator::Word => text.split(' ').collect(),
            Separator::Char => text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect(),
        };
        if *self == Separator::Char {
            return pieces;
        }
        pieces.into_iter().filter(|p| !p.trim().is_empty()).collect()
    }

    /// String placed between pieces when merging them back
    fn joiner(&self) -> &'static str {
        match self {
            Separator::Paragraph => "\n\n",
            Separator::Line => "\n",
            Separator::Word => " ",
            Separator::Sentence | Separator::Char => "",
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Chunking("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Chunking(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split text into overlapping chunks.
    ///
    /// Empty text yields no chunks; text that fits in one chunk is returned
    /// whole (trimmed) with no overlap.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        self.split_recursive(text, 0)
    }

    fn split_recursive(&self, text: &str, level: usize) -> Vec<String> {
        let separator = Separator::HIERARCHY[level.min(Separator::HIERARCHY.len() - 1)];
        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in separator.split(text) {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            // Oversized piece: flush what fits so far, then go one level finer
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator.joiner()));
                fitting.clear();
            }
            chunks.extend(self.split_recursive(piece, level + 1));
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator.joiner()));
        }

        chunks
    }

    /// Merge pieces that each fit into windows no longer than `chunk_size`
    fn merge(&self, pieces: &[&str], joiner: &str) -> Vec<String> {
        let joiner_len = char_len(joiner);
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let added = if window.is_empty() { len } else { len + joiner_len };

            if !window.is_empty() && total + added > self.chunk_size {
                push_chunk(&mut chunks, &window, joiner);

                // Keep a tail of at most `overlap` chars that still leaves room for `piece`
                while let Some(&(_, front_len)) = window.front() {
                    let room_needed = total + joiner_len + len > self.chunk_size;
                    if total <= self.overlap && !room_needed {
                        break;
                    }
                    window.pop_front();
                    total = total.saturating_sub(front_len);
                    if !window.is_empty() {
                        total = total.saturating_sub(joiner_len);
                    }
                }
            }

            total += if window.is_empty() { len } else { len + joiner_len };
            window.push_back((piece, len));
        }

        push_chunk(&mut chunks, &window, joiner);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>, joiner: &str) {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(joiner);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_text() {
        let chunker = TextChunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::default();
        let chunks = chunker.split("The sky is blue. The grass is green.");
        assert_eq!(chunks, vec!["The sky is blue. The grass is green.".to_string()]);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = TextChunker::new(40, 0).unwrap();
        let text = "First paragraph is here.\n\nSecond paragraph is here.";
        let chunks = chunker.split(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph is here.".to_string(),
                "Second paragraph is here.".to_string()
            ]
        );
    }

    #[test]
    fn test_overlap_carries_words() {
        let chunker = TextChunker::new(20, 8).unwrap();
        let chunks = chunker.split("alpha beta gamma delta epsilon zeta eta theta");

        assert_eq!(
            chunks,
            vec![
                "alpha beta gamma",
                "gamma delta epsilon",
                "epsilon zeta eta",
                "zeta eta theta",
            ]
        );
    }

    #[test]
    fn test_long_word_split_by_chars() {
        let chunker = TextChunker::new(10, 2).unwrap();
        let chunks = chunker.split(&"x".repeat(25));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[2].chars().count(), 9);
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = TextChunker::new(8, 2).unwrap();
        let chunks = chunker.split("héllo wörld ünïcode tèxt");
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
    }

    #[test]
    fn test_rejects_overlap_not_smaller() {
        assert!(TextChunker::new(10, 10).is_err());
        assert!(TextChunker::new(0, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_size(text in "[a-z .\n]{0,600}", size in 10usize..120, overlap_pct in 0usize..50) {
            let overlap = size * overlap_pct / 100;
            let chunker = TextChunker::new(size, overlap).unwrap();
            for chunk in chunker.split(&text) {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.trim().is_empty());
            }
        }

        #[test]
        fn prop_deterministic(text in "\\PC{0,400}") {
            let chunker = TextChunker::new(50, 10).unwrap();
            prop_assert_eq!(chunker.split(&text), chunker.split(&text));
        }

        #[test]
        fn prop_every_word_survives(words in proptest::collection::vec("[a-z]{1,8}", 1..80)) {
            let text = words.join(" ");
            let chunker = TextChunker::new(50, 10).unwrap();
            let chunks = chunker.split(&text);
            for word in &words {
                prop_assert!(chunks.iter().any(|c| c.contains(word.as_str())));
            }
        }
    }
}
