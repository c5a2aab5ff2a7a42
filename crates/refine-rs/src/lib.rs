//! Draft, critique, revise: three-stage answer refinement on top of an LLM.
//!
//! `refine-rs` takes a question and optional style guidance, asks a writer
//! model for a draft, asks an editor model to critique that draft, then asks
//! the writer to revise using the critique. The finished triple is saved to a
//! plain-text artifact that never overwrites an earlier run.
//!
//! Completions go through the [OpenRouter](https://openrouter.ai/) chat
//! completions API by default, but the pipeline only depends on the
//! [`CompletionClient`](api::completion::CompletionClient) trait.
//!
//! # Getting started
//!
//! ```ignore
//! use refine_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RefineError> {
//!     let api_key = ClientConfig::load_api_key(None)?;
//!     let client = OpenRouterClient::new(ClientConfig::new(api_key))?;
//!
//!     let outcome = RefinePipeline::new(&client, RefineConfig::new("openai/gpt-4o"))
//!         .with_event_handler(&LoggingHandler)
//!         .run_to_artifact("Why is the sky blue?", Some("keep it short"), &ArtifactWriter::new("."))
//!         .await?;
//!
//!     println!("{}", outcome.session.revision().unwrap_or_default());
//!     println!("saved to {}", outcome.artifact?.display());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`RefinePipeline`](pipeline::RefinePipeline), sessions, prompts, artifacts, events |
//! | [`api`] | [`CompletionClient`](api::CompletionClient) seam, retry with backoff, cost tracking |
//! | [`config`] | [`ClientConfig`](config::ClientConfig) and [`RefineConfig`](config::RefineConfig) |
//! | [`error`] | Typed failures for each layer |

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

use crate::api::completion::{Completion, CompletionClient, CompletionFuture, StageRequest};
use crate::config::ClientConfig;
use crate::error::{CompletionError, ConfigError};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for both the writer and editor roles.
pub const DEFAULT_MODEL: &str = "openai/gpt-4";

/// Default response-length hint for every stage.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible).
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
///
/// Each [`complete`](CompletionClient::complete) call sends exactly two
/// messages (system, user) and returns the first choice's text.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    referer: String,
    title: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterClient {
    /// Build a client from an immutable config.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("refine-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key,
            endpoint: config.endpoint,
            referer: config.referer,
            title: config.title,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The request body for one stage: exactly one system and one user message.
    pub fn build_request(&self, request: &StageRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: vec![
                Message::system(&request.system),
                Message::user(&request.user),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Send a chat completion request and extract the first choice's text.
    pub async fn chat(&self, body: &ChatRequest) -> Result<Completion, CompletionError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), text));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {e}")))?;

        if let Some(err) = parsed.error {
            let code = err
                .code
                .as_ref()
                .and_then(|c| c.as_u64().or_else(|| c.as_str()?.parse().ok()))
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(status.as_u16());
            return Err(classify_status(code, err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| CompletionError::MalformedResponse("response has no choices".into()))?;

        debug!(
            "LLM output: finish_reason={}",
            choice.finish_reason.as_deref().unwrap_or("(none)")
        );

        let content = choice.message.content.ok_or_else(|| {
            CompletionError::MalformedResponse("first choice has no message content".into())
        })?;

        Ok(Completion {
            text: content,
            usage: parsed.usage,
        })
    }
}

/// Map a failing status (HTTP or in-body error code) to an error kind.
fn classify_status(status: u16, body: String) -> CompletionError {
    match status {
        401 | 403 => CompletionError::Auth { status, body },
        _ => CompletionError::Status { status, body },
    }
}

impl CompletionClient for OpenRouterClient {
    fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = self.build_request(request);
            self.chat(&body).await
        })
    }
}
