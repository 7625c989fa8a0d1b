//! One conversation against one ready index.
//!
//! A [`Session`] owns the conversation history and the rolling summary, and
//! holds a shared handle to the index it queries. Nothing in it is
//! persisted: dropping the session discards the conversation.
//!
//! History and summary only change together, through
//! [`QaChain::answer`](crate::qa::QaChain::answer), after every step of a
//! turn has succeeded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::memory::ConversationMemory;
use crate::models::{IndexInfo, Turn};
use crate::store::VectorStore;

pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    index: Arc<dyn VectorStore>,
    index_info: IndexInfo,
    history: Vec<Turn>,
    memory: ConversationMemory,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("index_info", &self.index_info)
            .field("history", &self.history)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session on `index`.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexUnavailable`] when the store holds no ready index
    /// (never built, cleared, or a build that did not finish);
    /// [`RagError::Store`] when the store cannot be read.
    pub async fn attach(index: Arc<dyn VectorStore>, memory: ConversationMemory) -> Result<Self> {
        let index_info = index
            .info()
            .await
            .map_err(RagError::store)?
            .ok_or(RagError::IndexUnavailable)?;

        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            index,
            index_info,
            history: Vec::new(),
            memory,
        };
        info!(
            session = %session.id,
            repository = %session.index_info.repository,
            chunks = session.index_info.chunk_count,
            "session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn index(&self) -> &dyn VectorStore {
        self.index.as_ref()
    }

    /// Metadata of the index as it was when the session attached.
    pub fn index_info(&self) -> &IndexInfo {
        &self.index_info
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn summary(&self) -> &str {
        self.memory.summary()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Record a completed turn together with the summary that covers it.
    pub(crate) fn commit(&mut self, turn: Turn, summary: String) {
        self.history.push(turn);
        self.memory.replace(summary);
    }

    /// Forget the conversation but keep the index.
    pub fn reset(&mut self) {
        self.history.clear();
        self.memory.clear();
        info!(session = %self.id, "conversation reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn info() -> IndexInfo {
        IndexInfo {
            repository: "/tmp/repo".into(),
            model: "mock".into(),
            dims: 4,
            chunk_count: 0,
            built_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn attach_requires_ready_index() {
        let store = Arc::new(InMemoryStore::new());
        let err = Session::attach(store, ConversationMemory::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::IndexUnavailable));
    }

    #[tokio::test]
    async fn commit_and_reset() {
        let store = Arc::new(InMemoryStore::new());
        store.mark_ready(&info()).await.unwrap();
        let mut session = Session::attach(store, ConversationMemory::default())
            .await
            .unwrap();
        assert_eq!(session.index_info().repository, "/tmp/repo");

        session.commit(Turn::new("q", "a"), "summary".into());
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.summary(), "summary");

        session.reset();
        assert!(session.history().is_empty());
        assert!(session.summary().is_empty());
    }
}
