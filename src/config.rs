//! TOML configuration for `rchat`.
//!
//! Every section carries serde defaults, so an empty file (or a missing
//! section) yields a working configuration with embedding and generation
//! disabled. [`load_config`] parses and validates; [`Config::default`] is
//! the same configuration without a file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use repo_chat_core::chunk::SplitterConfig;
use repo_chat_core::retrieve::RetrievalParams;

/// Upper bound on concurrent embedding batches.
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub repo: RepoConfig,
    pub collector: CollectorConfig,
    pub chunking: ChunkingConfig,
    pub indexer: IndexerConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// SQLite file holding the one live index.
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/index.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RepoConfig {
    /// Clone target for remote repositories. Wiped before every clone.
    pub cache_dir: PathBuf,
    pub branch: Option<String>,
    pub shallow: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/repo"),
            branch: None,
            shallow: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CollectorConfig {
    /// Globs (relative to the repository root) to skip, in addition to `.git`.
    pub exclude_globs: Vec<String>,
    /// Extensions treated as binary on top of the built-in list, without dot.
    pub extra_binary_extensions: Vec<String>,
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let d = SplitterConfig::default();
        Self {
            chunk_size: d.chunk_size,
            chunk_overlap: d.chunk_overlap,
            min_chunk_chars: d.min_chunk_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            min_chunk_chars: self.min_chunk_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexerConfig {
    /// Chunks longer than this are dropped before embedding.
    pub max_chunk_chars: usize,
    pub batch_size: usize,
    /// Embedding batches in flight at once.
    pub concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 8000,
            batch_size: 50,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub fetch_k: usize,
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let d = RetrievalParams::default();
        Self {
            k: d.k,
            fetch_k: d.fetch_k,
            lambda: d.lambda,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            k: self.k,
            fetch_k: self.fetch_k,
            lambda: self.lambda,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL; provider default when unset.
    pub url: Option<String>,
    pub api_key_env: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_summary_chars: usize,
    /// Rewrite follow-up questions into standalone queries before retrieval.
    pub condense_questions: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_summary_chars: repo_chat_core::memory::DEFAULT_MAX_SUMMARY_CHARS,
            condense_questions: true,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Chunking
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        // Indexer
        if self.indexer.max_chunk_chars < self.chunking.chunk_size {
            bail!(
                "indexer.max_chunk_chars ({}) must be >= chunking.chunk_size ({})",
                self.indexer.max_chunk_chars,
                self.chunking.chunk_size
            );
        }
        if self.indexer.batch_size == 0 {
            bail!("indexer.batch_size must be > 0");
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.indexer.concurrency) {
            bail!("indexer.concurrency must be between 1 and {MAX_CONCURRENCY}");
        }

        // Retrieval
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            bail!(
                "retrieval.fetch_k ({}) must be >= retrieval.k ({})",
                self.retrieval.fetch_k,
                self.retrieval.k
            );
        }
        if !(0.0..=1.0).contains(&self.retrieval.lambda) {
            bail!("retrieval.lambda must be in [0.0, 1.0]");
        }

        // Embedding
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        // Generation
        match self.llm.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.llm.is_enabled() && self.llm.model.is_none() {
            bail!(
                "llm.model must be specified when provider is '{}'",
                self.llm.provider
            );
        }

        if self.memory.max_summary_chars == 0 {
            bail!("memory.max_summary_chars must be > 0");
        }

        Ok(())
    }
}
