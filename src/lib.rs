//! # repo-chat
//!
//! Ask natural-language questions about a source-code repository.
//!
//! The pipeline logic (chunking, MMR retrieval, conversation memory, the
//! question-answering chain) lives in `repo-chat-core`. This crate supplies
//! the I/O around it: repository acquisition, file collection, HTTP
//! embedding and chat providers, the SQLite vector store, and the `rchat`
//! commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐
//! │  acquire   │──▶│ collector  │──▶│  indexer   │──▶│  SQLite  │
//! │ dir / git  │   │ text files │   │chunk+embed │   │  index   │
//! └────────────┘   └────────────┘   └────────────┘   └────┬─────┘
//!                                                         │
//!                                  ┌──────────────────────┤
//!                                  ▼                      ▼
//!                            ┌───────────┐         ┌────────────┐
//!                            │  search   │         │ ask / chat │
//!                            │ (MMR only)│         │ (QaChain)  │
//!                            └───────────┘         └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`acquire`] | Local directory or `git clone` |
//! | [`collector`] | Repository walk and text-file filtering |
//! | [`indexer`] | Wipe-and-rebuild index construction |
//! | [`embedding`] | OpenAI / Ollama embedding providers |
//! | [`llm`] | OpenAI / Ollama chat providers |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`chat`] | `ask` and the interactive REPL |

pub mod acquire;
pub mod chat;
pub mod collector;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod status;
