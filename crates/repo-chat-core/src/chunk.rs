//! Recursive, overlapping text chunker.
//!
//! Splits each [`Document`] into [`Chunk`]s of at most `chunk_size`
//! characters, with consecutive chunks sharing up to `chunk_overlap`
//! characters of context so meaning is not severed at a boundary.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs in
//!    the text (`""` means "between any two characters").
//! 2. Split on it, keeping each separator attached to the start of the piece
//!    that follows it.
//! 3. Pieces shorter than `chunk_size` are greedily merged into windows.
//!    When a window is full it is emitted (trimmed), then pieces are dropped
//!    from its front until at most `chunk_overlap` characters remain. Those
//!    become the start of the next window.
//! 4. Pieces that are too long on their own are split again with the
//!    remaining, finer separators.
//! 5. Chunks shorter than `min_chunk_chars` after trimming are dropped.
//!
//! All lengths are measured in characters, never bytes, so multi-byte UTF-8
//! is never cut mid-character. Splitting is a pure function of the content
//! and the configuration.
//!
//! # Example
//!
//! ```rust
//! use repo_chat_core::chunk::{SplitterConfig, TextSplitter};
//! use repo_chat_core::models::Document;
//!
//! let splitter = TextSplitter::new(SplitterConfig::default());
//! let chunks = splitter.split(&Document::new("src/lib.rs", "fn main() {}\n\nfn helper() {}"));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! assert_eq!(chunks[0].source_path, "src/lib.rs");
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Target maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks shorter than this (after trimming) are dropped.
    pub min_chunk_chars: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
            min_chunk_chars: 1,
        }
    }
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// Create a splitter. An overlap that is not smaller than the chunk size
    /// is clamped so every window still makes progress.
    #[must_use]
    pub fn new(mut config: SplitterConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        if config.chunk_overlap >= config.chunk_size {
            config.chunk_overlap = config.chunk_size - 1;
        }
        config.min_chunk_chars = config.min_chunk_chars.max(1);
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split one document. Chunk indices are contiguous from 0.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.content)
            .into_iter()
            .filter(|piece| char_len(piece) >= self.config.min_chunk_chars)
            .enumerate()
            .map(|(index, content)| make_chunk(&document.source_path, index, content))
            .collect()
    }

    /// Split every document, preserving document order.
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.split(doc)).collect()
    }

    /// Split raw text into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &DEFAULT_SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                // No finer separator left: an atomic unit longer than the target.
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily merge small pieces into overlapping windows.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
            ..
        } = self.config;

        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > chunk_size && !window.is_empty() {
                push_joined(&window, &mut out);
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&window, &mut out);
        out
    }
}

fn push_joined(window: &VecDeque<&str>, out: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split `text` on `separator`, attaching each separator to the start of the
/// following piece. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Create a [`Chunk`] with a deterministic id and a SHA-256 content hash.
fn make_chunk(source_path: &str, index: usize, content: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut id_hasher = Sha256::new();
    id_hasher.update(source_path.as_bytes());
    id_hasher.update(index.to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize())[..32].to_string();

    Chunk {
        id,
        source_path: source_path.to_string(),
        chunk_index: index,
        content,
        hash,
    }
}
