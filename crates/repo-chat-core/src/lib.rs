//! # repo-chat core
//!
//! The retrieval-and-conversation pipeline behind `rchat`: data models,
//! chunking, the embedding / generation / vector-store seams, MMR
//! retrieval, rolling conversation memory, and the question-answering
//! chain that ties them to a [`session::Session`].
//!
//! This crate does no network, database, or filesystem I/O. Concrete
//! providers and the SQLite store live in the `repo-chat` app crate and
//! plug in through the traits defined here.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod mmr;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
pub mod qa;
pub mod retrieve;
pub mod session;
pub mod store;

pub use error::{RagError, Result};
