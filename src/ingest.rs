//! `rchat ingest`: acquire → collect → chunk → embed → store.
//!
//! Wraps [`crate::indexer`] with the I/O around it: resolving the
//! repository, walking its files, opening the SQLite index, and printing a
//! summary to stdout.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use repo_chat_core::chunk::TextSplitter;

use crate::acquire::acquire;
use crate::collector::Collector;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::indexer::{index_documents, BuildOutcome};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::sqlite_store::SqliteStore;

pub async fn run_ingest(
    config: &Config,
    locator: &str,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    // Fail before touching the existing index if nothing can be embedded.
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding] provider in the config to ingest");
    }
    let embedder = create_provider(&config.embedding)?;

    progress.report(IngestProgressEvent::Acquiring {
        locator: locator.to_string(),
    });
    let repo_config = config.repo.clone();
    let owned_locator = locator.to_string();
    let root = tokio::task::spawn_blocking(move || acquire(&owned_locator, &repo_config))
        .await
        .context("repository acquisition task panicked")??;

    progress.report(IngestProgressEvent::Collecting);
    let collector = Collector::new(&config.collector)?.exclude_paths(state_paths(config, &root));
    let walk_root = root.clone();
    let documents = tokio::task::spawn_blocking(move || collector.collect(&walk_root))
        .await
        .context("file collection task panicked")??;

    let store = SqliteStore::open(&config.index.path).await?;
    let splitter = TextSplitter::new(config.chunking.splitter());
    let outcome = index_documents(
        &store,
        embedder.as_ref(),
        locator,
        &documents,
        &splitter,
        &config.indexer,
        progress,
    )
    .await;
    store.close().await;

    match outcome? {
        BuildOutcome::Ready(stats) => {
            println!("ingest {}", locator);
            println!("  root: {}", root.display());
            println!("  files: {}", stats.documents);
            println!("  chunks: {}", stats.chunks);
            println!("  indexed: {}", stats.indexed);
            println!("  skipped (oversized): {}", stats.oversized);
            println!("  index: {}", config.index.path.display());
            println!("ok");
            Ok(())
        }
        BuildOutcome::EmptyCorpus(reason) => {
            bail!("{} in {}; the index is now empty", reason, locator)
        }
    }
}

/// The index file (with its SQLite sidecars) and the clone cache, when they
/// sit inside `root`. Ingesting a tree that contains `./data` must not feed
/// the previous index or a previously cloned repository back into the new
/// one. A cache dir that is the root itself is the repository being indexed.
fn state_paths(config: &Config, root: &Path) -> Vec<PathBuf> {
    let Ok(root) = root.canonicalize() else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    if let Some(index) = resolve(&config.index.path) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut name = index.as_os_str().to_owned();
            name.push(suffix);
            paths.push(PathBuf::from(name));
        }
    }
    if let Some(cache) = resolve(&config.repo.cache_dir) {
        if cache != root {
            paths.push(cache);
        }
    }

    paths.retain(|p| p.starts_with(&root) && *p != root);
    paths
}

/// Canonical form of `path`, which may not exist yet (its parent must).
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(path) = path.canonicalize() {
        return Some(path);
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.canonicalize().ok()?,
        _ => std::env::current_dir().ok()?,
    };
    Some(parent.join(path.file_name()?))
}
