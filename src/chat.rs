//! `rchat ask` and `rchat chat`: question answering against the live index.
//!
//! Both commands attach a [`Session`] to the SQLite index and drive turns
//! through a [`QaChain`]. `ask` runs a single turn; `chat` is a line-based
//! REPL where a failed turn is reported and the conversation carries on
//! from its last good state.

use anyhow::{bail, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use repo_chat_core::memory::ConversationMemory;
use repo_chat_core::qa::{Answer, QaChain};
use repo_chat_core::retrieve::Retriever;
use repo_chat_core::session::Session;
use repo_chat_core::store::VectorStore;
use repo_chat_core::RagError;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::llm::create_generator;
use crate::sqlite_store::SqliteStore;

const HELP: &str = "commands: /history  /summary  /reset  /help  /quit";

/// Build the chain and attach a session to the configured index.
async fn open_chat(config: &Config) -> Result<(QaChain, Session)> {
    if !config.llm.is_enabled() {
        bail!("Language model is disabled; set [llm] provider in the config");
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding] provider in the config");
    }
    let path = &config.index.path;
    if !path.exists() {
        bail!(
            "No index at {}; run `rchat ingest <repo>` first",
            path.display()
        );
    }

    let embedder = create_provider(&config.embedding)?;
    let generator = create_generator(&config.llm)?;
    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open(path).await?);
    let session = Session::attach(store, ConversationMemory::new(config.memory.max_summary_chars))
        .await?;

    if session.index_info().model != embedder.model_name() {
        warn!(
            index_model = %session.index_info().model,
            query_model = %embedder.model_name(),
            "index was built with a different embedding model"
        );
    }

    let chain = QaChain::new(Retriever::new(embedder, config.retrieval.params()), generator)
        .condense_questions(config.memory.condense_questions);
    Ok((chain, session))
}

/// Answer one question and print it, either as text or as JSON.
pub async fn run_ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let (chain, mut session) = open_chat(config).await?;
    let answer = chain.answer(&mut session, question).await?;

    let mut out = std::io::stdout();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&answer)?)?;
    } else {
        print_answer(&mut out, &answer)?;
    }
    Ok(())
}

/// Interactive session on stdin/stdout.
pub async fn run_chat(config: &Config) -> Result<()> {
    let (chain, mut session) = open_chat(config).await?;

    let mut out = std::io::stdout();
    writeln!(
        out,
        "repo-chat: {} ({} chunks)",
        session.index_info().repository,
        session.index_info().chunk_count
    )?;
    writeln!(out, "{}", HELP)?;

    let stdin = BufReader::new(tokio::io::stdin());
    repl(&chain, &mut session, stdin, &mut out).await
}

async fn repl<R, W>(chain: &QaChain, session: &mut Session, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/help" => writeln!(out, "{}", HELP)?,
            "/reset" => {
                session.reset();
                writeln!(out, "conversation cleared")?;
            }
            "/summary" => {
                if session.summary().is_empty() {
                    writeln!(out, "(no summary yet)")?;
                } else {
                    writeln!(out, "{}", session.summary())?;
                }
            }
            "/history" => {
                if session.history().is_empty() {
                    writeln!(out, "(no turns yet)")?;
                }
                for (i, turn) in session.history().iter().enumerate() {
                    writeln!(out, "{}. Q: {}", i + 1, turn.question)?;
                    writeln!(out, "   A: {}", turn.answer)?;
                }
            }
            cmd if cmd.starts_with('/') => {
                writeln!(out, "unknown command {}; {}", cmd, HELP)?;
            }
            question => match chain.answer(session, question).await {
                Ok(answer) => print_answer(out, &answer)?,
                Err(err) => report_turn_error(out, &err)?,
            },
        }
    }
    Ok(())
}

fn report_turn_error<W: Write>(out: &mut W, err: &RagError) -> Result<()> {
    warn!(error = %err, "turn failed");
    if err.is_recoverable() {
        writeln!(out, "error: {} (conversation unchanged, try again)", err)?;
    } else {
        writeln!(out, "error: {}", err)?;
    }
    Ok(())
}

fn print_answer<W: Write>(out: &mut W, answer: &Answer) -> Result<()> {
    writeln!(out, "{}", answer.text)?;
    if !answer.sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for (i, source) in answer.sources.iter().enumerate() {
            writeln!(
                out,
                "  {}. {} (chunk {}) [{:.2}]",
                i + 1,
                source.path,
                source.chunk_index,
                source.relevance
            )?;
        }
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repo_chat_core::embedding::EmbeddingProvider;
    use repo_chat_core::mock::{MockEmbedder, MockGenerator};
    use repo_chat_core::models::{Chunk, IndexInfo};
    use repo_chat_core::store::memory::InMemoryStore;

    async fn fixture(generator: MockGenerator) -> (QaChain, Session) {
        let embedder = Arc::new(MockEmbedder::new());
        let store = InMemoryStore::new();
        let content = "fn add(a: i32, b: i32) -> i32 { a + b } adds two numbers".to_string();
        let vectors = embedder.embed(&[content.clone()]).await.unwrap();
        store
            .upsert(
                &[Chunk {
                    id: "math.rs:0".into(),
                    source_path: "math.rs".into(),
                    chunk_index: 0,
                    content,
                    hash: "h".into(),
                }],
                &vectors,
            )
            .await
            .unwrap();
        store
            .mark_ready(&IndexInfo {
                repository: "local".into(),
                model: embedder.model_name().into(),
                dims: embedder.dims(),
                chunk_count: 1,
                built_at: Utc::now(),
            })
            .await
            .unwrap();

        let session = Session::attach(Arc::new(store), ConversationMemory::new(2000))
            .await
            .unwrap();
        let chain = QaChain::new(
            Retriever::new(embedder, Default::default()),
            Arc::new(generator),
        );
        (chain, session)
    }

    async fn drive(chain: &QaChain, session: &mut Session, script: &str) -> String {
        let mut out = Vec::new();
        repl(chain, session, script.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn repl_answers_and_shows_history() {
        let generator = MockGenerator::new(["It adds numbers.", "User asked about add."]);
        let (chain, mut session) = fixture(generator).await;

        let out = drive(&chain, &mut session, "how does add work\n/history\n/summary\n/quit\n").await;

        assert!(out.contains("It adds numbers."));
        assert!(out.contains("Sources:"));
        assert!(out.contains("math.rs (chunk 0)"));
        assert!(out.contains("1. Q: how does add work"));
        assert!(out.contains("User asked about add."));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn repl_survives_a_failed_turn() {
        let generator = MockGenerator::new(["unused"]).fail_from(1);
        let (chain, mut session) = fixture(generator).await;

        let out = drive(&chain, &mut session, "what is add\n/history\n").await;

        assert!(out.contains("error: generation failed"));
        assert!(out.contains("conversation unchanged"));
        assert!(out.contains("(no turns yet)"));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn repl_reset_and_unknown_command() {
        let generator = MockGenerator::new(["Answer.", "Summary."]);
        let (chain, mut session) = fixture(generator).await;

        let out = drive(&chain, &mut session, "add?\n/reset\n/bogus\n").await;

        assert!(out.contains("conversation cleared"));
        assert!(out.contains("unknown command /bogus"));
        assert!(session.history().is_empty());
        assert!(session.summary().is_empty());
    }

    #[test]
    fn answer_without_sources_omits_the_list() {
        let answer = Answer {
            text: "No idea.".into(),
            standalone_query: "q".into(),
            sources: Vec::new(),
        };
        let mut out = Vec::new();
        print_answer(&mut out, &answer).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No idea.\n\n");
    }
}
