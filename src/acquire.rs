//! Repository acquisition.
//!
//! Turns a locator into a local directory the collector can walk:
//!
//! - an existing local directory is used in place;
//! - a remote locator (`https://`, `ssh://`, `git://`, `file://`, or
//!   `user@host:path`) is cloned with the `git` CLI into
//!   `repo.cache_dir`, which is deleted first so files from a previously
//!   ingested repository never leak into the new index.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use repo_chat_core::error::RagError;

use crate::config::RepoConfig;

/// Resolve `locator` to a local directory.
///
/// # Errors
///
/// [`RagError::Acquisition`] when the locator is neither an existing
/// directory nor a cloneable remote, or when `git clone` fails.
pub fn acquire(locator: &str, config: &RepoConfig) -> Result<PathBuf, RagError> {
    acquire_inner(locator, config).map_err(|e| RagError::Acquisition {
        locator: locator.to_string(),
        reason: format!("{e:#}"),
    })
}

fn acquire_inner(locator: &str, config: &RepoConfig) -> Result<PathBuf> {
    let locator = locator.trim();
    if locator.is_empty() {
        bail!("repository locator is empty");
    }

    let local = Path::new(locator);
    if local.is_dir() {
        let path = local
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", local.display()))?;
        info!(path = %path.display(), "using local repository");
        return Ok(path);
    }

    if !looks_remote(locator) {
        bail!("no such directory, and not a git URL");
    }

    let dest = &config.cache_dir;
    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .with_context(|| format!("Failed to clear clone directory: {}", dest.display()))?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    git_clone(locator, config.branch.as_deref(), config.shallow, dest)?;
    info!(url = locator, path = %dest.display(), "repository cloned");
    Ok(dest.clone())
}

fn looks_remote(locator: &str) -> bool {
    const SCHEMES: [&str; 5] = ["https://", "http://", "ssh://", "git://", "file://"];
    if SCHEMES.iter().any(|s| locator.starts_with(s)) {
        return true;
    }
    // scp-like syntax: git@github.com:org/repo.git
    match (locator.find('@'), locator.find(':')) {
        (Some(at), Some(colon)) => at < colon && !locator.contains(' '),
        _ => false,
    }
}

fn git_clone(url: &str, branch: Option<&str>, shallow: bool, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone");
    if let Some(branch) = branch {
        cmd.args(["--branch", branch, "--single-branch"]);
    }
    if shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(url);
    cmd.arg(dest);

    let output = cmd
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_config(cache: &Path) -> RepoConfig {
        RepoConfig {
            cache_dir: cache.to_path_buf(),
            branch: None,
            shallow: true,
        }
    }

    #[test]
    fn local_directory_is_used_in_place() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let path = acquire(tmp.path().to_str().unwrap(), &repo_config(&cache)).unwrap();
        assert_eq!(path, tmp.path().canonicalize().unwrap());
        assert!(!cache.exists(), "local repositories are not copied");
    }

    #[test]
    fn unknown_local_path_is_an_acquisition_error() {
        let tmp = TempDir::new().unwrap();
        let err = acquire("./no/such/dir", &repo_config(&tmp.path().join("cache"))).unwrap_err();
        match err {
            RagError::Acquisition { locator, reason } => {
                assert_eq!(locator, "./no/such/dir");
                assert!(reason.contains("not a git URL"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_clone_still_clears_previous_checkout() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("stale.rs"), "old repo").unwrap();

        let missing = format!("file://{}/missing.git", tmp.path().display());
        let err = acquire(&missing, &repo_config(&cache)).unwrap_err();

        assert!(matches!(err, RagError::Acquisition { .. }));
        assert!(!cache.join("stale.rs").exists());
    }

    #[test]
    fn recognises_remote_locators() {
        assert!(looks_remote("https://github.com/org/repo"));
        assert!(looks_remote("git@github.com:org/repo.git"));
        assert!(looks_remote("file:///srv/git/repo.git"));
        assert!(!looks_remote("./relative/path"));
        assert!(!looks_remote("C:\\code\\repo"));
    }
}
