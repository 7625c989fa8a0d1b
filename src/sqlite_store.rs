//! SQLite-backed [`VectorStore`] implementation.
//!
//! The index lives in a single SQLite file (`index.path`). Chunks and their
//! embeddings share one table; the `index_meta` row is the ready marker.
//! Queries are brute-force cosine similarity over every stored vector,
//! which is plenty for one repository at a time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use repo_chat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use repo_chat_core::models::{Chunk, IndexInfo};
use repo_chat_core::store::{check_pairing, sort_candidates, Candidate, VectorStore};

use crate::db;
use crate::migrate::run_migrations;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the index file at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_pairing(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, chunk_index, content, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_path = excluded.source_path,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    hash = excluded.hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_path)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            "SELECT id, source_path, chunk_index, content, hash, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let chunk_index: i64 = row.get("chunk_index");
                Candidate {
                    score: cosine_similarity(vector, &stored),
                    vector: stored,
                    chunk: Chunk {
                        id: row.get("id"),
                        source_path: row.get("source_path"),
                        chunk_index: chunk_index as usize,
                        content: row.get("content"),
                        hash: row.get("hash"),
                    },
                }
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn mark_ready(&self, info: &IndexInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO index_meta (id, repository, model, dims, chunk_count, built_at)
            VALUES (1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&info.repository)
        .bind(&info.model)
        .bind(info.dims as i64)
        .bind(info.chunk_count as i64)
        .bind(info.built_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn info(&self) -> Result<Option<IndexInfo>> {
        let row = sqlx::query(
            "SELECT repository, model, dims, chunk_count, built_at FROM index_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let built_at: String = row.get("built_at");
        let dims: i64 = row.get("dims");
        let chunk_count: i64 = row.get("chunk_count");
        Ok(Some(IndexInfo {
            repository: row.get("repository"),
            model: row.get("model"),
            dims: dims as usize,
            chunk_count: chunk_count as usize,
            built_at: DateTime::parse_from_rfc3339(&built_at)
                .with_context(|| format!("Corrupt index_meta.built_at: {built_at}"))?
                .with_timezone(&Utc),
        }))
    }

    async fn chunk_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(path: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("{path}:{index}"),
            source_path: path.to_string(),
            chunk_index: index,
            content: format!("{path} part {index}"),
            hash: "h".to_string(),
        }
    }

    fn info(count: usize) -> IndexInfo {
        IndexInfo {
            repository: "https://example.com/repo.git".to_string(),
            model: "test-model".to_string(),
            dims: 2,
            chunk_count: count,
            built_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/index.sqlite");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store
                .upsert(
                    &[chunk("a.rs", 0), chunk("b.rs", 0)],
                    &[vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .await
                .unwrap();
            store.mark_ready(&info(2)).await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        let meta = store.info().await.unwrap().unwrap();
        assert_eq!(meta.chunk_count, 2);
        assert_eq!(meta.model, "test-model");

        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source_path, "b.rs");
        assert_eq!(results[0].vector, vec![0.0, 1.0]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn clear_removes_chunks_and_ready_marker() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        store
            .upsert(&[chunk("a.rs", 0)], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store.mark_ready(&info(1)).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.info().await.unwrap().is_none());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
        assert!(store.query(&[1.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        store
            .upsert(&[chunk("a.rs", 0)], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .upsert(&[chunk("a.rs", 0)], &[vec![0.0, 1.0]])
            .await
            .unwrap();

        assert_eq!(store.chunk_count().await.unwrap(), 1);
        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_rejects_unpaired_vectors() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        assert!(store.upsert(&[chunk("a.rs", 0)], &[]).await.is_err());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }
}
