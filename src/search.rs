//! `rchat search`: run retrieval alone and print the selected chunks.
//!
//! Useful for checking what context a question would be answered from,
//! without spending a generation call.

use anyhow::{bail, Result};

use repo_chat_core::retrieve::{RetrievedChunk, Retriever};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

const SNIPPET_CHARS: usize = 160;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    if !config.index.path.exists() {
        println!("No results.");
        return Ok(());
    }

    let mut params = config.retrieval.params();
    if let Some(k) = k {
        params.k = k;
    }
    let retriever = Retriever::new(create_provider(&config.embedding)?, params);

    let store = SqliteStore::open(&config.index.path).await?;
    let results = retriever.retrieve(&store, query).await;
    store.close().await;
    let results = results?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &RetrievedChunk) {
    println!(
        "{}. [{:.2}] {} (chunk {})",
        rank, result.relevance, result.chunk.source_path, result.chunk.chunk_index
    );
    println!("    excerpt: \"{}\"", snippet(&result.chunk.content));
    println!("    id: {}", result.chunk.id);
    println!();
}

/// First [`SNIPPET_CHARS`] characters on one line.
fn snippet(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
