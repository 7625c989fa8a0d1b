//! Error taxonomy for the retrieval-and-conversation pipeline.
//!
//! Collaborator traits ([`EmbeddingProvider`](crate::embedding::EmbeddingProvider),
//! [`GenerationProvider`](crate::llm::GenerationProvider),
//! [`VectorStore`](crate::store::VectorStore)) return `anyhow::Result`
//! because their failures are opaque. The pipeline converts those failures
//! into [`RagError`] at the point where it knows which collaborator failed.

use std::fmt;

/// Why an ingestion run produced nothing to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyCorpus {
    /// The collector found no readable, non-blank text files.
    NoDocuments,
    /// Documents were found but chunking (and size filtering) left nothing.
    NoChunks,
}

impl fmt::Display for EmptyCorpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyCorpus::NoDocuments => f.write_str("no valid files found"),
            EmptyCorpus::NoChunks => f.write_str("no text chunks created"),
        }
    }
}

/// Failures surfaced by ingestion and by a conversation turn.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The repository locator could not be cloned or is not a readable directory.
    #[error("failed to acquire repository '{locator}': {reason}")]
    Acquisition { locator: String, reason: String },

    /// Collection or chunking left nothing to index; the previous index is kept.
    #[error("empty corpus: {0}")]
    EmptyCorpus(EmptyCorpus),

    /// The embedding provider failed or returned vectors of the wrong count.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The chat provider failed while condensing, answering, or summarizing.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The vector store could not be read or written.
    #[error("vector store error: {0}")]
    Store(String),

    /// A session was opened against an index that was never marked ready.
    #[error("no index is available; ingest a repository first")]
    IndexUnavailable,

    /// The question was empty or only whitespace.
    #[error("question is empty")]
    EmptyQuestion,
}

impl RagError {
    pub fn embedding(err: anyhow::Error) -> Self {
        RagError::Embedding(format!("{err:#}"))
    }

    pub fn generation(err: anyhow::Error) -> Self {
        RagError::Generation(format!("{err:#}"))
    }

    pub fn store(err: anyhow::Error) -> Self {
        RagError::Store(format!("{err:#}"))
    }

    /// True for failures worth retrying from scratch: collaborator outages
    /// and a missing index that can be rebuilt. Retrying an empty corpus or
    /// an empty question gives the same result.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RagError::EmptyQuestion | RagError::EmptyCorpus(_))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
