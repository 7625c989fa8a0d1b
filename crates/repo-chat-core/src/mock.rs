//! Deterministic collaborators for tests.
//!
//! [`MockEmbedder`] hashes word prefixes into a fixed-size bag-of-words
//! vector, so texts that share vocabulary (including inflections such as
//! "add" and "addition") land close together without a model.
//! [`MockGenerator`] replays scripted replies and records every prompt.
//!
//! Both can be told to start failing after a number of calls, which is how
//! the failure-atomicity tests inject collaborator outages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::llm::{GenerationProvider, Message};

const DEFAULT_DIMS: usize = 256;
const PREFIX_CHARS: usize = 3;

pub struct MockEmbedder {
    dims: usize,
    fail_after: Option<usize>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dims(DEFAULT_DIMS)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            fail_after: None,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Succeed for the first `calls` calls to `embed`, fail afterwards.
    pub fn fail_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sizes of the batches passed to successful `embed` calls, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    /// Embed one text synchronously.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 2)
        {
            let prefix: String = word.chars().take(PREFIX_CHARS).flat_map(char::to_lowercase).collect();
            let slot = (fnv1a(prefix.as_bytes()) % self.dims as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            bail!("mock embedder: injected failure on call {call}");
        }
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(texts.len());
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

pub struct MockGenerator {
    replies: Vec<String>,
    fail_from: Option<usize>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockGenerator {
    /// Reply with `replies` in order; once exhausted, repeat the last one.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            fail_from: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call whose zero-based index is `call` or later.
    pub fn fail_from(mut self, call: usize) -> Self {
        self.fail_from = Some(call);
        self
    }

    /// Every message list received so far, including failed calls.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    fn model_name(&self) -> &str {
        "mock-llm"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let call = {
            let mut prompts = self
                .prompts
                .lock()
                .map_err(|_| anyhow!("mock generator lock poisoned"))?;
            prompts.push(messages.to_vec());
            prompts.len() - 1
        };
        if self.fail_from.is_some_and(|from| call >= from) {
            bail!("mock generator: injected failure on call {call}");
        }
        self.replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| anyhow!("mock generator has no scripted replies"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn shared_prefixes_are_similar() {
        let e = MockEmbedder::new();
        let query = e.vector_for("how does addition work");
        let add = e.vector_for("function add(a, b) returns a + b");
        let other = e.vector_for("cloudy skies with light rain expected");
        assert!(cosine_similarity(&query, &add) > cosine_similarity(&query, &other));
    }

    #[tokio::test]
    async fn embedder_fails_after_limit() {
        let e = MockEmbedder::new().fail_after(1);
        assert!(e.embed(&["a b".into()]).await.is_ok());
        assert!(e.embed(&["a b".into()]).await.is_err());
        assert_eq!(e.batch_sizes(), vec![1]);
        assert_eq!(e.calls(), 2);
    }

    #[tokio::test]
    async fn generator_replays_and_records() {
        let g = MockGenerator::new(["one", "two"]).fail_from(3);
        let msgs = [Message::user("hi")];
        assert_eq!(g.generate(&msgs).await.unwrap(), "one");
        assert_eq!(g.generate(&msgs).await.unwrap(), "two");
        assert_eq!(g.generate(&msgs).await.unwrap(), "two");
        assert!(g.generate(&msgs).await.is_err());
        assert_eq!(g.calls(), 4);
        assert_eq!(g.prompts()[0][0].content, "hi");
    }
}
