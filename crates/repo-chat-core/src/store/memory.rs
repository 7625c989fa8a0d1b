//! In-memory [`VectorStore`] implementation for tests and throwaway sessions.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety.
//! Queries are brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, IndexInfo};

use super::{check_pairing, sort_candidates, Candidate, VectorStore};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, StoredChunk>,
    info: Option<IndexInfo>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.chunks.clear();
        inner.info = None;
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_pairing(chunks, vectors)?;
        let mut inner = self.write()?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            inner.chunks.insert(
                chunk.id.clone(),
                StoredChunk {
                    chunk: chunk.clone(),
                    vector: vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let inner = self.read()?;
        let mut candidates: Vec<Candidate> = inner
            .chunks
            .values()
            .map(|stored| Candidate {
                chunk: stored.chunk.clone(),
                vector: stored.vector.clone(),
                score: cosine_similarity(vector, &stored.vector),
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn mark_ready(&self, info: &IndexInfo) -> Result<()> {
        self.write()?.info = Some(info.clone());
        Ok(())
    }

    async fn info(&self) -> Result<Option<IndexInfo>> {
        Ok(self.read()?.info.clone())
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.chunks.len())
    }
}
