//! Index construction.
//!
//! [`build_index`] always rebuilds from nothing:
//!
//! 1. Clear the store (chunks and ready marker).
//! 2. Drop chunks longer than `indexer.max_chunk_chars`.
//! 3. Embed and upsert in batches of `indexer.batch_size`, with at most
//!    `indexer.concurrency` batches in flight.
//! 4. Mark the index ready.
//!
//! If any batch fails the store is cleared again and the error returned, so
//! a failed build never leaves a partial index that looks usable. Running
//! the build again is always safe.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use repo_chat_core::chunk::TextSplitter;
use repo_chat_core::embedding::EmbeddingProvider;
use repo_chat_core::error::{EmptyCorpus, RagError};
use repo_chat_core::models::{Chunk, Document, IndexInfo};
use repo_chat_core::store::VectorStore;

use crate::config::{IndexerConfig, MAX_CONCURRENCY};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

/// Counters from a completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks embedded and stored.
    pub indexed: usize,
    /// Chunks dropped for exceeding the size ceiling.
    pub oversized: usize,
    pub batches: usize,
}

/// Result of a build that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The index is fully populated and marked ready.
    Ready(IndexStats),
    /// Nothing to index. The store is left empty.
    EmptyCorpus(EmptyCorpus),
}

impl BuildOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, BuildOutcome::Ready(_))
    }
}

/// Chunk `documents` and build the index from the result.
pub async fn index_documents(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    repository: &str,
    documents: &[Document],
    splitter: &TextSplitter,
    config: &IndexerConfig,
    progress: &dyn IngestProgressReporter,
) -> Result<BuildOutcome, RagError> {
    if documents.is_empty() {
        store.clear().await.map_err(RagError::store)?;
        info!(repository, "no valid files found");
        return Ok(BuildOutcome::EmptyCorpus(EmptyCorpus::NoDocuments));
    }

    progress.report(IngestProgressEvent::Chunking {
        documents: documents.len() as u64,
    });
    let chunks = splitter.split_documents(documents);
    debug!(documents = documents.len(), chunks = chunks.len(), "documents split");

    let outcome = build_index(store, embedder, repository, chunks, config, progress).await?;
    Ok(match outcome {
        BuildOutcome::Ready(mut stats) => {
            stats.documents = documents.len();
            BuildOutcome::Ready(stats)
        }
        other => other,
    })
}

/// Replace whatever the store holds with an index of `chunks`.
///
/// # Errors
///
/// [`RagError::Embedding`] or [`RagError::Store`] when a batch fails; the
/// store is empty afterwards.
pub async fn build_index(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    repository: &str,
    chunks: Vec<Chunk>,
    config: &IndexerConfig,
    progress: &dyn IngestProgressReporter,
) -> Result<BuildOutcome, RagError> {
    store.clear().await.map_err(RagError::store)?;

    let total_chunks = chunks.len();
    let (chunks, oversized): (Vec<Chunk>, Vec<Chunk>) = chunks
        .into_iter()
        .partition(|c| c.char_len() <= config.max_chunk_chars);
    for chunk in &oversized {
        warn!(
            path = %chunk.source_path,
            chunk = chunk.chunk_index,
            chars = chunk.char_len(),
            limit = config.max_chunk_chars,
            "skipping oversized chunk"
        );
    }

    if chunks.is_empty() {
        info!(repository, "no text chunks created");
        return Ok(BuildOutcome::EmptyCorpus(EmptyCorpus::NoChunks));
    }

    match write_batches(store, embedder, &chunks, config, progress).await {
        Ok(batches) => {
            let info = IndexInfo {
                repository: repository.to_string(),
                model: embedder.model_name().to_string(),
                dims: embedder.dims(),
                chunk_count: chunks.len(),
                built_at: chrono::Utc::now(),
            };
            if let Err(e) = store.mark_ready(&info).await {
                discard_partial(store).await;
                return Err(RagError::store(e));
            }
            info!(
                repository,
                chunks = chunks.len(),
                oversized = oversized.len(),
                batches,
                "index ready"
            );
            Ok(BuildOutcome::Ready(IndexStats {
                documents: 0,
                chunks: total_chunks,
                indexed: chunks.len(),
                oversized: oversized.len(),
                batches,
            }))
        }
        Err(e) => {
            warn!(error = %e, "index build failed; discarding partial index");
            discard_partial(store).await;
            Err(e)
        }
    }
}

async fn write_batches(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    chunks: &[Chunk],
    config: &IndexerConfig,
    progress: &dyn IngestProgressReporter,
) -> Result<usize, RagError> {
    let batch_size = config.batch_size.max(1);
    let concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
    let total = chunks.len() as u64;
    let dims = embedder.dims();

    let mut results = stream::iter(chunks.chunks(batch_size).enumerate())
        .map(|(i, batch)| async move {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embedder.embed(&texts).await.map_err(RagError::embedding)?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "batch {i}: sent {} texts, received {} vectors",
                    batch.len(),
                    vectors.len()
                )));
            }
            if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
                return Err(RagError::Embedding(format!(
                    "batch {i}: expected {dims} dimensions, got {}",
                    v.len()
                )));
            }
            store.upsert(batch, &vectors).await.map_err(RagError::store)?;
            debug!(batch = i, size = batch.len(), "batch stored");
            Ok::<usize, RagError>(batch.len())
        })
        .buffered(concurrency);

    let mut written = 0u64;
    let mut batches = 0usize;
    while let Some(result) = results.next().await {
        written += result? as u64;
        batches += 1;
        progress.report(IngestProgressEvent::Embedding { n: written, total });
    }
    Ok(batches)
}

async fn discard_partial(store: &dyn VectorStore) {
    if let Err(e) = store.clear().await {
        warn!(error = %format!("{e:#}"), "failed to clear partial index");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use anyhow::Result;
    use async_trait::async_trait;
    use repo_chat_core::chunk::SplitterConfig;
    use repo_chat_core::mock::MockEmbedder;
    use repo_chat_core::store::memory::InMemoryStore;
    use repo_chat_core::store::Candidate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(i: usize, content: &str) -> Chunk {
        Chunk {
            id: format!("c{i}"),
            source_path: format!("f{}.rs", i / 10),
            chunk_index: i % 10,
            content: content.to_string(),
            hash: String::new(),
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| chunk(i, &format!("chunk body {i}"))).collect()
    }

    fn config(batch_size: usize, concurrency: usize) -> IndexerConfig {
        IndexerConfig {
            max_chunk_chars: 100,
            batch_size,
            concurrency,
        }
    }

    /// Store that fails the `fail_on`-th upsert (zero-based).
    struct FlakyStore {
        inner: InMemoryStore,
        upserts: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
        async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                anyhow::bail!("disk full");
            }
            self.inner.upsert(chunks, vectors).await
        }
        async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Candidate>> {
            self.inner.query(vector, limit).await
        }
        async fn mark_ready(&self, info: &IndexInfo) -> Result<()> {
            self.inner.mark_ready(info).await
        }
        async fn info(&self) -> Result<Option<IndexInfo>> {
            self.inner.info().await
        }
        async fn chunk_count(&self) -> Result<usize> {
            self.inner.chunk_count().await
        }
    }

    #[tokio::test]
    async fn builds_in_batches_and_marks_ready() {
        let store = InMemoryStore::new();
        let embedder = MockEmbedder::new();
        let outcome = build_index(&store, &embedder, "repo", chunks(120), &config(50, 1), &NoProgress)
            .await
            .unwrap();

        let BuildOutcome::Ready(stats) = outcome else {
            panic!("expected a ready index");
        };
        assert_eq!(stats.indexed, 120);
        assert_eq!(stats.batches, 3);
        assert_eq!(embedder.batch_sizes(), vec![50, 50, 20]);
        assert_eq!(store.chunk_count().await.unwrap(), 120);

        let info = store.info().await.unwrap().unwrap();
        assert_eq!(info.chunk_count, 120);
        assert_eq!(info.model, "mock-embedding");
        assert_eq!(info.repository, "repo");
    }

    #[tokio::test]
    async fn concurrent_batches_all_land() {
        let store = InMemoryStore::new();
        let embedder = MockEmbedder::new();
        let outcome = build_index(&store, &embedder, "repo", chunks(70), &config(10, 4), &NoProgress)
            .await
            .unwrap();
        assert!(outcome.is_ready());
        assert_eq!(embedder.calls(), 7);
        assert_eq!(store.chunk_count().await.unwrap(), 70);
    }

    #[tokio::test]
    async fn oversized_chunks_are_skipped() {
        let store = InMemoryStore::new();
        let embedder = MockEmbedder::new();
        let mut input = chunks(3);
        input.push(chunk(3, &"x".repeat(101)));

        let outcome = build_index(&store, &embedder, "repo", input, &config(50, 1), &NoProgress)
            .await
            .unwrap();
        let BuildOutcome::Ready(stats) = outcome else {
            panic!("expected a ready index");
        };
        assert_eq!(stats.chunks, 4);
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.oversized, 1);
    }

    #[tokio::test]
    async fn only_oversized_chunks_is_an_empty_corpus() {
        let store = InMemoryStore::new();
        let outcome = build_index(
            &store,
            &MockEmbedder::new(),
            "repo",
            vec![chunk(0, &"y".repeat(500))],
            &config(50, 1),
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(outcome, BuildOutcome::EmptyCorpus(EmptyCorpus::NoChunks));
        assert!(store.info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_documents_clears_previous_index() {
        let store = InMemoryStore::new();
        let embedder = MockEmbedder::new();
        build_index(&store, &embedder, "old", chunks(5), &config(50, 1), &NoProgress)
            .await
            .unwrap();

        let splitter = TextSplitter::new(SplitterConfig::default());
        let outcome = index_documents(&store, &embedder, "new", &[], &splitter, &config(50, 1), &NoProgress)
            .await
            .unwrap();
        assert_eq!(outcome, BuildOutcome::EmptyCorpus(EmptyCorpus::NoDocuments));
        assert!(!outcome.is_ready());
        assert!(store.info().await.unwrap().is_none());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_leaves_no_index() {
        let store = InMemoryStore::new();
        let embedder = MockEmbedder::new().fail_after(1);
        let err = build_index(&store, &embedder, "repo", chunks(30), &config(10, 1), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.info().await.unwrap().is_none());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_leaves_no_index() {
        let store = FlakyStore {
            inner: InMemoryStore::new(),
            upserts: AtomicUsize::new(0),
            fail_on: 1,
        };
        let err = build_index(&store, &MockEmbedder::new(), "repo", chunks(30), &config(10, 2), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(ref m) if m.contains("disk full")));
        assert!(store.info().await.unwrap().is_none());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rebuild_after_failure_succeeds() {
        let store = InMemoryStore::new();
        let failing = MockEmbedder::new().fail_after(0);
        assert!(build_index(&store, &failing, "repo", chunks(5), &config(50, 1), &NoProgress)
            .await
            .is_err());

        let outcome = build_index(&store, &MockEmbedder::new(), "repo", chunks(5), &config(50, 1), &NoProgress)
            .await
            .unwrap();
        assert!(outcome.is_ready());
        assert_eq!(store.chunk_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn wrong_dimensions_fail_the_build() {
        struct ShortVectors;

        #[async_trait]
        impl EmbeddingProvider for ShortVectors {
            fn model_name(&self) -> &str {
                "short"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let store = InMemoryStore::new();
        let err = build_index(&store, &ShortVectors, "repo", chunks(2), &config(50, 1), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 4 dimensions"));
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }
}
