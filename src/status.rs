//! Index status overview.
//!
//! `rchat status` reports where the index lives and what it holds: the
//! repository it was built from, the embedding model, the chunk count and
//! when it was built. A missing file, an empty store and an unfinished
//! build all read as "no index".

use anyhow::Result;
use chrono::{DateTime, Utc};

use repo_chat_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the status command: inspect the index and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let path = &config.index.path;

    println!("repo-chat index status");
    println!("======================");
    println!();
    println!("  Index:       {}", path.display());

    if !path.exists() {
        println!("  Status:      no index (run `rchat ingest <repo>` first)");
        println!();
        return Ok(());
    }

    let db_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    println!("  Size:        {}", format_bytes(db_size));

    let store = SqliteStore::open(path).await?;
    let info = store.info().await?;
    let stored_chunks = store.chunk_count().await?;
    store.close().await;

    match info {
        Some(info) => {
            println!("  Status:      ready");
            println!("  Repository:  {}", info.repository);
            println!("  Model:       {} ({} dims)", info.model, info.dims);
            println!("  Chunks:      {}", info.chunk_count);
            println!("  Built:       {}", format_relative(info.built_at, Utc::now()));
        }
        None if stored_chunks > 0 => {
            println!("  Status:      incomplete build ({} chunks, not usable)", stored_chunks);
        }
        None => {
            println!("  Status:      no index (run `rchat ingest <repo>` first)");
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
