//! Repository file collector.
//!
//! Walks a local directory tree and turns every text-looking file into a
//! [`Document`]. Binary and media files are skipped by extension; everything
//! else is read and decoded leniently, with invalid UTF-8 replaced by
//! U+FFFD. A file that cannot be read is logged and skipped; only problems
//! with the root itself abort the walk.
//!
//! # Exclusions
//!
//! - `**/.git/**` always, plus `collector.exclude_globs` (relative paths).
//! - Extensions in [`BINARY_EXTENSIONS`] and `collector.extra_binary_extensions`
//!   (case-insensitive).
//! - Files that decode to empty or whitespace-only content.
//! - Absolute paths registered with [`Collector::exclude_paths`] (the
//!   index file and clone cache when they live inside the walked tree).

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use repo_chat_core::models::Document;

use crate::config::CollectorConfig;

/// Extensions treated as binary without looking at the content.
pub const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "whl",
    // executables and libraries
    "exe", "dll", "so", "dylib", "a", "o", "obj", "class", "pyc", "wasm", "bin",
    // audio / video
    "mp3", "mp4", "avi", "mov", "mkv", "wav", "flac", "ogg", "webm",
    // documents and fonts
    "pdf", "woff", "woff2", "ttf", "otf", "eot",
];

pub struct Collector {
    excludes: GlobSet,
    binary_extensions: HashSet<String>,
    follow_symlinks: bool,
    excluded_paths: Vec<PathBuf>,
}

impl Collector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string(), ".git/**".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());

        let binary_extensions = BINARY_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .chain(
                config
                    .extra_binary_extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase()),
            )
            .collect();

        Ok(Self {
            excludes: build_globset(&excludes)?,
            binary_extensions,
            follow_symlinks: config.follow_symlinks,
            excluded_paths: Vec::new(),
        })
    }

    /// Skip these files or directories (and everything below them). Paths
    /// are compared after canonicalizing the walk root, so pass canonical
    /// paths.
    pub fn exclude_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.excluded_paths.extend(paths);
        self
    }

    /// Collect every text document under `root`, sorted by relative path.
    ///
    /// # Errors
    ///
    /// Only when `root` does not exist or is not a directory.
    pub fn collect(&self, root: &Path) -> Result<Vec<Document>> {
        if !root.is_dir() {
            bail!("Repository root is not a directory: {}", root.display());
        }

        let canonical = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        let root = canonical.as_path();

        let mut documents = Vec::new();
        let mut skipped = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| !self.is_excluded_path(e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.excludes.is_match(&rel_str) || self.is_binary(path) {
                continue;
            }

            match read_text(path) {
                Ok(content) if content.trim().is_empty() => {
                    debug!(path = %rel_str, "skipping blank file");
                }
                Ok(content) => documents.push(Document::new(rel_str, content)),
                Err(e) => {
                    warn!(path = %rel_str, error = %format!("{e:#}"), "skipping file");
                    skipped += 1;
                }
            }
        }

        documents.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        info!(
            root = %root.display(),
            documents = documents.len(),
            skipped,
            "collected repository files"
        );
        Ok(documents)
    }

    fn is_excluded_path(&self, path: &Path) -> bool {
        self.excluded_paths.iter().any(|p| path.starts_with(p))
    }

    fn is_binary(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                self.binary_extensions
                    .contains(&ext.to_string_lossy().to_ascii_lowercase())
            })
            .unwrap_or(false)
    }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {pattern}"))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.source_path.as_str()).collect()
    }

    #[test]
    fn collects_nested_text_files_sorted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/lib.rs", b"pub fn add() {}");
        write(tmp.path(), "README.md", b"# Title");
        write(tmp.path(), "src/deep/nested/mod.rs", b"mod x;");

        let docs = Collector::new(&CollectorConfig::default())
            .unwrap()
            .collect(tmp.path())
            .unwrap();
        assert_eq!(paths(&docs), vec!["README.md", "src/deep/nested/mod.rs", "src/lib.rs"]);
        assert_eq!(docs[2].content, "pub fn add() {}");
    }

    #[test]
    fn skips_binary_extensions_git_and_blank_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "logo.PNG", b"\x89PNG\r\n");
        write(tmp.path(), "dist/app.tar.gz", b"\x1f\x8b");
        write(tmp.path(), ".git/config", b"[core]");
        write(tmp.path(), "empty.txt", b"  \n\t ");
        write(tmp.path(), "main.py", b"print('hi')");

        let docs = Collector::new(&CollectorConfig::default())
            .unwrap()
            .collect(tmp.path())
            .unwrap();
        assert_eq!(paths(&docs), vec!["main.py"]);
    }

    #[test]
    fn honours_configured_exclusions() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "target/debug/out.txt", b"build output");
        write(tmp.path(), "data.parquet", b"PAR1");
        write(tmp.path(), "keep.rs", b"fn keep() {}");

        let config = CollectorConfig {
            exclude_globs: vec!["target/**".into()],
            extra_binary_extensions: vec![".Parquet".into()],
            follow_symlinks: false,
        };
        let docs = Collector::new(&config).unwrap().collect(tmp.path()).unwrap();
        assert_eq!(paths(&docs), vec!["keep.rs"]);
    }

    #[test]
    fn replaces_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "latin1.txt", b"caf\xe9 au lait");

        let docs = Collector::new(&CollectorConfig::default())
            .unwrap()
            .collect(tmp.path())
            .unwrap();
        assert_eq!(docs[0].content, "caf\u{FFFD} au lait");
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let docs = Collector::new(&CollectorConfig::default())
            .unwrap()
            .collect(tmp.path())
            .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = Collector::new(&CollectorConfig::default())
            .unwrap()
            .collect(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn skips_excluded_paths() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.rs", b"fn main() {}");
        write(tmp.path(), "data/index.sqlite", b"SQLite format 3\0garbage");
        write(tmp.path(), "data/repo/foreign.rs", b"fn foreign() {}");
        write(tmp.path(), "data/notes.txt", b"kept");

        let root = tmp.path().canonicalize().unwrap();
        let docs = Collector::new(&CollectorConfig::default())
            .unwrap()
            .exclude_paths([root.join("data/index.sqlite"), root.join("data/repo")])
            .collect(tmp.path())
            .unwrap();
        assert_eq!(paths(&docs), vec!["data/notes.txt", "main.rs"]);
    }

    #[test]
    fn rejects_invalid_glob() {
        let config = CollectorConfig {
            exclude_globs: vec!["[".into()],
            ..Default::default()
        };
        assert!(Collector::new(&config).is_err());
    }
}
