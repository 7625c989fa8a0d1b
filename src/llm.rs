//! Generation provider implementations.
//!
//! Concrete backends for [`GenerationProvider`]:
//! - **[`DisabledGenerator`]**: returns errors; used when no model is configured.
//! - **[`OpenAIGenerator`]**: `POST {url}/chat/completions` on any OpenAI-compatible API.
//! - **[`OllamaGenerator`]**: `POST {url}/api/chat` with `stream: false`.
//!
//! Requests go through [`crate::http::post_json`] and share its retry policy.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use repo_chat_core::llm::{GenerationProvider, Message, Role};

use crate::config::LlmConfig;
use crate::embedding::{OLLAMA_DEFAULT_URL, OPENAI_DEFAULT_URL};
use crate::http::{build_client, endpoint, post_json, RetryPolicy};

/// Build the generator named by `config.provider`.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _messages: &[Message]) -> Result<String> {
        bail!("Language model is disabled; set [llm] provider in the config")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAIGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for OpenAI provider"))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            api_key: api_key.into(),
            model,
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::to_value(ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        })?;
        let json = post_json(
            &self.client,
            &endpoint(&self.url, "chat/completions"),
            Some(&self.api_key),
            &body,
            &self.retry,
            "OpenAI",
        )
        .await?;

        let response: ChatResponse = serde_json::from_value(json)
            .map_err(|e| anyhow!("Invalid OpenAI chat response: {}", e))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Invalid OpenAI chat response: no message content"))
    }
}

// ============ Ollama ============

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for Ollama provider"))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model,
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::to_value(OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        })?;
        let json = post_json(
            &self.client,
            &endpoint(&self.url, "api/chat"),
            None,
            &body,
            &self.retry,
            "Ollama",
        )
        .await?;

        let response: OllamaChatResponse = serde_json::from_value(json)
            .map_err(|e| anyhow!("Invalid Ollama chat response: {}", e))?;
        response
            .message
            .content
            .ok_or_else(|| anyhow!("Invalid Ollama chat response: no message content"))
    }
}
