//! Document ingestion: splitting raw text into indexable chunks

mod chunker;

pub use chunker::TextChunker;
