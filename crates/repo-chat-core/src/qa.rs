//! Question answering over a [`Session`].
//!
//! # Turn
//!
//! 1. **Condense** (follow-ups only): ask the model to rewrite the question
//!    as a standalone query using the conversation summary, so pronouns
//!    like "it" resolve before retrieval.
//! 2. **Retrieve** context chunks for the standalone query.
//! 3. **Answer**: one generation call with the summary, the retrieved
//!    chunks tagged by source path, and the question.
//! 4. **Summarize** the finished turn into a new rolling summary.
//! 5. **Commit** the turn and the new summary to the session together.
//!
//! Any failure in steps 1-4 returns an error before step 5, so a failed
//! turn leaves history and summary exactly as they were.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::llm::{GenerationProvider, Message};
use crate::models::Turn;
use crate::retrieve::{RetrievedChunk, Retriever};
use crate::session::Session;

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions about a source-code repository. \
Use the retrieved context and the conversation summary to answer. If the context does not \
contain the answer, say what you can infer and state that you are unsure rather than \
inventing details.";

const CONDENSE_SYSTEM_PROMPT: &str = "Given a conversation summary and a follow-up question, \
rephrase the follow-up question to be a standalone question that can be understood without \
the conversation. Reply with the question only.";

/// Where an answer's context came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub path: String,
    pub chunk_index: usize,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// The query actually used for retrieval.
    pub standalone_query: String,
    pub sources: Vec<Source>,
}

pub struct QaChain {
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    condense_questions: bool,
}

impl QaChain {
    pub fn new(retriever: Retriever, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            retriever,
            generator,
            condense_questions: true,
        }
    }

    /// Toggle follow-up condensation (on by default). When off, the raw
    /// question is used for retrieval.
    pub fn condense_questions(mut self, enabled: bool) -> Self {
        self.condense_questions = enabled;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run one turn. On success the session gains one history entry and a
    /// new summary; on error it is unchanged.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuestion`] for a blank question.
    /// - [`RagError::Embedding`] / [`RagError::Store`] from retrieval.
    /// - [`RagError::Generation`] from condensation, answering, or summarizing.
    pub async fn answer(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let standalone = self.standalone_query(session, question).await?;
        let context = self.retriever.retrieve(session.index(), &standalone).await?;
        debug!(
            query = %standalone,
            chunks = context.len(),
            "context retrieved"
        );

        let messages = [
            Message::system(ANSWER_SYSTEM_PROMPT),
            Message::user(build_answer_prompt(
                session.summary(),
                &context,
                question,
                &standalone,
            )),
        ];
        let text = self
            .generator
            .generate(&messages)
            .await
            .map_err(RagError::generation)?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RagError::Generation("model returned an empty answer".into()));
        }

        let turn = Turn::new(question, text.clone());
        let summary = session
            .memory()
            .summarize(self.generator.as_ref(), &turn)
            .await
            .map_err(RagError::generation)?;

        session.commit(turn, summary);
        info!(
            session = %session.id(),
            turns = session.history().len(),
            sources = context.len(),
            "turn completed"
        );

        Ok(Answer {
            text,
            standalone_query: standalone,
            sources: context
                .iter()
                .map(|r| Source {
                    path: r.chunk.source_path.clone(),
                    chunk_index: r.chunk.chunk_index,
                    relevance: r.relevance,
                })
                .collect(),
        })
    }

    async fn standalone_query(&self, session: &Session, question: &str) -> Result<String> {
        if !self.condense_questions || session.history().is_empty() {
            return Ok(question.to_string());
        }

        let messages = [
            Message::system(CONDENSE_SYSTEM_PROMPT),
            Message::user(build_condense_prompt(session.summary(), question)),
        ];
        let rewritten = self
            .generator
            .generate(&messages)
            .await
            .map_err(RagError::generation)?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            warn!("condensed question was empty; retrieving with the original question");
            return Ok(question.to_string());
        }
        Ok(rewritten.to_string())
    }
}

fn build_condense_prompt(summary: &str, question: &str) -> String {
    format!("Conversation summary:\n{summary}\n\nFollow-up question: {question}\n\nStandalone question:")
}

fn build_answer_prompt(
    summary: &str,
    context: &[RetrievedChunk],
    question: &str,
    standalone: &str,
) -> String {
    let mut prompt = String::new();

    if !summary.is_empty() {
        let _ = write!(prompt, "Conversation so far (summary):\n{summary}\n\n");
    }

    if context.is_empty() {
        prompt.push_str("Retrieved context: none found.\n\n");
    } else {
        prompt.push_str("Retrieved context:\n");
        for r in context {
            let _ = write!(
                prompt,
                "--- {} (chunk {}) ---\n{}\n\n",
                r.chunk.source_path, r.chunk.chunk_index, r.chunk.content
            );
        }
    }

    let _ = write!(prompt, "Question: {question}");
    if standalone != question {
        let _ = write!(prompt, "\n(Interpreted as: {standalone})");
    }
    prompt
}
