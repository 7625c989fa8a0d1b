//! Core data models that flow through the ingestion and query paths.
//!
//! [`Document`]s are produced by the collector and consumed by the chunker;
//! [`Chunk`]s are the unit of embedding and retrieval; [`Turn`]s make up a
//! session's conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A text file read from the repository tree.
///
/// Immutable once collected and discarded after chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File content, decoded permissively (invalid UTF-8 replaced).
    pub content: String,
    /// Path of the file relative to the repository root.
    pub source_path: String,
}

impl Document {
    pub fn new(source_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_path: source_path.into(),
        }
    }
}

/// A bounded slice of one document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier derived from `source_path` and `chunk_index`.
    pub id: String,
    pub source_path: String,
    /// Position of this chunk within its document, contiguous from 0.
    pub chunk_index: usize,
    pub content: String,
    /// SHA-256 of `content`.
    pub hash: String,
}

impl Chunk {
    /// Length of the content in characters (the unit every size bound uses).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// One completed question/answer exchange. Appended to history, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// Metadata describing the index that is currently live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Locator of the ingested repository (URL or local path).
    pub repository: String,
    /// Embedding model used to build the index.
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}
