//! Rolling conversation summary.
//!
//! After every completed turn the language model is asked to fold the turn
//! into the previous summary, and the result *replaces* the summary. The
//! text handed to later prompts therefore stays bounded no matter how long
//! the conversation runs, at the cost of losing detail from older turns.
//!
//! The summary lives only as long as its [`Session`](crate::session::Session).

use anyhow::{bail, Result};

use crate::llm::{GenerationProvider, Message};
use crate::models::Turn;

/// Default upper bound on the stored summary, in characters.
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    summary: String,
    max_chars: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUMMARY_CHARS)
    }
}

impl ConversationMemory {
    pub fn new(max_chars: usize) -> Self {
        Self {
            summary: String::new(),
            max_chars: max_chars.max(1),
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Ask the model for a new summary covering the current one plus `turn`.
    ///
    /// Does not modify `self`; the caller commits the returned text with
    /// [`replace`](Self::replace) once the whole turn has succeeded.
    ///
    /// # Errors
    ///
    /// Propagates generation failures, and rejects a blank reply.
    pub async fn summarize(&self, generator: &dyn GenerationProvider, turn: &Turn) -> Result<String> {
        let messages = [
            Message::system(
                "You maintain a running summary of a conversation about a source-code \
                 repository. Preserve key facts, names, and decisions needed to \
                 continue the conversation. Be brief.",
            ),
            Message::user(build_summary_prompt(&self.summary, turn)),
        ];
        let reply = generator.generate(&messages).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            bail!("model returned an empty summary");
        }
        Ok(truncate_chars(reply, self.max_chars).to_string())
    }

    /// Replace the summary, truncating to the configured bound.
    pub(crate) fn replace(&mut self, mut summary: String) {
        if let Some((idx, _)) = summary.char_indices().nth(self.max_chars) {
            summary.truncate(idx);
        }
        self.summary = summary;
    }

    pub fn clear(&mut self) {
        self.summary.clear();
    }
}

fn build_summary_prompt(current: &str, turn: &Turn) -> String {
    let mut prompt = String::from(
        "Progressively summarize the conversation, adding onto the current summary \
         and returning a new summary.\n\nCurrent summary:\n",
    );
    if current.is_empty() {
        prompt.push_str("(none)");
    } else {
        prompt.push_str(current);
    }
    prompt.push_str("\n\nNew lines of conversation:\n");
    prompt.push_str("user: ");
    prompt.push_str(&turn.question);
    prompt.push_str("\nassistant: ");
    prompt.push_str(&turn.answer);
    prompt.push_str("\n\nNew summary:");
    prompt
}

/// Longest prefix of `s` with at most `max` characters.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
