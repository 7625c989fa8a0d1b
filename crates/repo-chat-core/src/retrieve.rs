//! Query-time retrieval: embed, fetch a candidate pool, diversify.
//!
//! # Algorithm
//!
//! 1. Check the store holds a ready index; otherwise return nothing.
//! 2. Embed the query with the same provider that built the index.
//! 3. Fetch the `fetch_k` nearest chunks by cosine similarity.
//! 4. Run [`mmr_select`] over the pool to pick `k` chunks, trading
//!    relevance against redundancy with weight `lambda`.
//!
//! Missing indexes and empty pools are not errors: retrieval degrades to
//! "no context" and the caller decides what that means. A store that cannot
//! be read is an error, never an empty result.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::mmr::mmr_select;
use crate::models::Chunk;
use crate::store::VectorStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Number of chunks to return.
    pub k: usize,
    /// Size of the nearest-neighbor pool MMR chooses from. Raised to `k`
    /// when smaller.
    pub fetch_k: usize,
    /// Relevance weight: `1.0` is plain top-k, `0.0` is pure diversity.
    pub lambda: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 8,
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

/// A chunk chosen for a query, with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub relevance: f32,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, params: RetrievalParams) -> Self {
        Self { embedder, params }
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    /// Return up to `k` chunks for `query`, in selection order.
    ///
    /// # Errors
    ///
    /// [`RagError::Embedding`] if the query cannot be embedded or its vector
    /// does not match the index dimensionality; [`RagError::Store`] if the
    /// index metadata or the candidate query cannot be read.
    pub async fn retrieve(&self, store: &dyn VectorStore, query: &str) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() || self.params.k == 0 {
            return Ok(Vec::new());
        }

        let info = match store.info().await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!("no ready index; retrieval returns no context");
                return Ok(Vec::new());
            }
            Err(e) => return Err(RagError::store(e)),
        };

        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .map_err(RagError::embedding)?;
        if query_vec.len() != info.dims {
            return Err(RagError::Embedding(format!(
                "query vector has {} dimensions but the index was built with {} ({})",
                query_vec.len(),
                info.dims,
                info.model
            )));
        }

        let pool_size = self.params.fetch_k.max(self.params.k);
        let pool = store
            .query(&query_vec, pool_size)
            .await
            .map_err(RagError::store)?;
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let vectors: Vec<&[f32]> = pool.iter().map(|c| c.vector.as_slice()).collect();
        let picked = mmr_select(&query_vec, &vectors, self.params.k, self.params.lambda);
        debug!(pool = pool.len(), selected = picked.len(), "retrieved chunks");

        let mut slots: Vec<Option<_>> = pool.into_iter().map(Some).collect();
        Ok(picked
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(|c| RetrievedChunk {
                chunk: c.chunk,
                relevance: c.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmbedder;
    use crate::models::IndexInfo;
    use crate::store::memory::InMemoryStore;
    use crate::store::Candidate;
    use chrono::Utc;

    fn chunk(path: &str, index: usize, content: &str) -> Chunk {
        Chunk {
            id: format!("{path}#{index}"),
            source_path: path.to_string(),
            chunk_index: index,
            content: content.to_string(),
            hash: String::new(),
        }
    }

    async fn indexed(embedder: &MockEmbedder, chunks: Vec<Chunk>) -> InMemoryStore {
        let store = InMemoryStore::new();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        store.upsert(&chunks, &vectors).await.unwrap();
        store
            .mark_ready(&IndexInfo {
                repository: "repo".into(),
                model: embedder.model_name().into(),
                dims: embedder.dims(),
                chunk_count: chunks.len(),
                built_at: Utc::now(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_index_returns_empty() {
        let retriever = Retriever::new(Arc::new(MockEmbedder::new()), RetrievalParams::default());
        let store = InMemoryStore::new();
        let results = retriever.retrieve(&store, "anything").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unready_index_returns_empty() {
        let embedder = MockEmbedder::new();
        let store = InMemoryStore::new();
        let c = chunk("a.rs", 0, "fn add");
        let v = embedder.embed(&[c.content.clone()]).await.unwrap();
        store.upsert(&[c], &v).await.unwrap();

        let retriever = Retriever::new(Arc::new(embedder), RetrievalParams::default());
        assert!(retriever.retrieve(&store, "add").await.unwrap().is_empty());
    }

    /// A store whose metadata read always fails, as a locked database does.
    struct LockedStore;

    #[async_trait::async_trait]
    impl VectorStore for LockedStore {
        async fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn upsert(&self, _chunks: &[Chunk], _vectors: &[Vec<f32>]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn query(&self, _vector: &[f32], _limit: usize) -> anyhow::Result<Vec<Candidate>> {
            Ok(Vec::new())
        }
        async fn mark_ready(&self, _info: &IndexInfo) -> anyhow::Result<()> {
            Ok(())
        }
        async fn info(&self) -> anyhow::Result<Option<IndexInfo>> {
            anyhow::bail!("database is locked")
        }
        async fn chunk_count(&self) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_unreadable_index_is_a_store_error() {
        let embedder = MockEmbedder::new();
        let retriever = Retriever::new(Arc::new(embedder), RetrievalParams::default());

        let err = retriever
            .retrieve(&LockedStore, "how does add work")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
        assert!(err.to_string().contains("database is locked"));
    }

    #[tokio::test]
    async fn test_blank_query_returns_empty() {
        let embedder = MockEmbedder::new();
        let store = indexed(&embedder, vec![chunk("a.rs", 0, "fn add")]).await;
        let retriever = Retriever::new(Arc::new(embedder), RetrievalParams::default());
        assert!(retriever.retrieve(&store, "   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relevant_chunk_ranks_first() {
        let embedder = MockEmbedder::new();
        let store = indexed(
            &embedder,
            vec![
                chunk("math.rs", 0, "function add(a, b) returns a + b"),
                chunk("weather.txt", 0, "cloudy skies with light rain expected"),
            ],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), RetrievalParams::default());

        let results = retriever.retrieve(&store, "how does addition work").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source_path, "math.rs");
        assert!(results[0].relevance > results[1].relevance);
    }

    #[tokio::test]
    async fn test_returns_at_most_k() {
        let embedder = MockEmbedder::new();
        let chunks = (0..12)
            .map(|i| chunk("many.rs", i, &format!("item number {i} in the list")))
            .collect();
        let store = indexed(&embedder, chunks).await;
        let params = RetrievalParams {
            k: 5,
            fetch_k: 3,
            lambda: 0.5,
        };
        let retriever = Retriever::new(Arc::new(embedder), params);
        let results = retriever.retrieve(&store, "item list").await.unwrap();
        assert_eq!(results.len(), 5, "fetch_k is raised to k");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let embedder = MockEmbedder::new();
        let store = indexed(&embedder, vec![chunk("a.rs", 0, "fn add")]).await;
        let retriever = Retriever::new(
            Arc::new(MockEmbedder::new().fail_after(0)),
            RetrievalParams::default(),
        );
        let err = retriever.retrieve(&store, "add").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_reported() {
        let embedder = MockEmbedder::new();
        let store = indexed(&embedder, vec![chunk("a.rs", 0, "fn add")]).await;
        let retriever = Retriever::new(
            Arc::new(MockEmbedder::with_dims(16)),
            RetrievalParams::default(),
        );
        let err = retriever.retrieve(&store, "add").await.unwrap_err();
        assert!(err.to_string().contains("16 dimensions"));
    }
}
