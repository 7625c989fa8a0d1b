//! Storage abstraction for the vector index.
//!
//! The [`VectorStore`] trait defines every storage operation the indexing
//! and retrieval pipeline needs, so the SQLite backend in the app crate and
//! the [`memory::InMemoryStore`] used by tests are interchangeable.
//!
//! An index has two states. While chunks are being written it is *building*
//! and [`info`](VectorStore::info) returns `None`; once the indexer calls
//! [`mark_ready`](VectorStore::mark_ready) it is *ready*. [`clear`](VectorStore::clear)
//! returns it to empty, discarding the ready marker along with the chunks.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, IndexInfo};

/// A stored chunk returned from a similarity query.
///
/// Carries the stored vector so that diversity re-ranking can compare
/// candidates with each other without another round-trip.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Abstract storage backend for chunk embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`clear`](VectorStore::clear) | Drop all chunks and the ready marker |
/// | [`upsert`](VectorStore::upsert) | Add chunks with their vectors |
/// | [`query`](VectorStore::query) | Nearest chunks by cosine similarity |
/// | [`mark_ready`](VectorStore::mark_ready) | Publish the index |
/// | [`info`](VectorStore::info) | Metadata of the ready index, if any |
/// | [`chunk_count`](VectorStore::chunk_count) | Number of stored chunks |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Remove every chunk and the ready marker.
    async fn clear(&self) -> Result<()>;

    /// Insert chunks paired with their vectors. Re-inserting a chunk id
    /// replaces the earlier row.
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Return up to `limit` chunks ordered by descending similarity to
    /// `vector` (see [`sort_candidates`]).
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Candidate>>;

    /// Record that the index is complete and may be queried.
    async fn mark_ready(&self, info: &IndexInfo) -> Result<()>;

    /// Metadata of the ready index, or `None` when the store is empty or
    /// a build has not completed.
    async fn info(&self) -> Result<Option<IndexInfo>>;

    async fn chunk_count(&self) -> Result<usize>;
}

/// Order candidates by score (desc), then source path and chunk index
/// (asc) so equal scores resolve the same way on every backend.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.source_path.cmp(&b.chunk.source_path))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

/// Fail unless every chunk has exactly one vector.
pub fn check_pairing(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "{} chunks but {} vectors; every chunk needs exactly one vector",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}
