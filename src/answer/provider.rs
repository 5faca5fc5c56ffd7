//! Upstream answer providers.
//!
//! A provider gets exactly one attempt per question. Every way that attempt can
//! go wrong is folded into [`ProviderFailure`] so the caller can fall through
//! to the next provider without inspecting transport errors.

use super::Question;
use crate::config::ProviderConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Instruction sent ahead of every question
pub const SYSTEM_PROMPT: &str = "你是一位专业的材料科学专家，熟悉金属、高分子、陶瓷、复合材料和半导体材料的成分、性能、加工工艺与应用。请用准确、简洁、结构清晰的中文回答用户的问题；如果问题超出材料领域，请礼貌说明并给出力所能及的建议。";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// Why a single provider attempt did not produce an answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderFailure {
    /// No response within the configured timeout
    #[error("request timed out")]
    Timeout,
    /// The provider answered 429
    #[error("rate limited by provider")]
    RateLimited,
    /// The provider rejected the credential
    #[error("credential rejected (HTTP {0})")]
    Unauthorized(u16),
    /// Any other non-success status
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    /// The body was not JSON or carried no answer text
    #[error("malformed response: {0}")]
    MalformedPayload(String),
    /// Connection, TLS or other transport failure
    #[error("network error: {0}")]
    Network(String),
}

impl ProviderFailure {
    /// Stable label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized(_) => "unauthorized",
            Self::Status(_) => "status",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Network(_) => "network",
        }
    }

    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(status.as_u16()),
            other => Self::Status(other.as_u16()),
        }
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status)
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Something that can turn a question into answer text
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Name used in logs and in the answer source
    fn name(&self) -> &str;

    /// Makes one attempt to answer the question
    async fn ask(&self, question: &Question) -> std::result::Result<String, ProviderFailure>;
}

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    config: ProviderConfig,
}

impl fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("config", &self.config)
            .finish()
    }
}

impl ChatCompletionsProvider {
    /// Builds a client whose every request is bounded by the configured timeout
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("material-ai/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body(&self, question: &Question) -> Value {
        json!({
            "model": self.config.model,
            "messages": [{
                "role": "system",
                "content": SYSTEM_PROMPT
            }, {
                "role": "user",
                "content": question.as_str()
            }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS
        })
    }
}

#[async_trait]
impl AnswerProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn ask(&self, question: &Question) -> std::result::Result<String, ProviderFailure> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(question))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderFailure::from_status(status));
        }

        let body = response.text().await?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderFailure::MalformedPayload(e.to_string()))?;
        extract_answer(&payload)
    }
}

/// Pulls the first choice's message content out of a chat-completions payload
pub fn extract_answer(payload: &Value) -> std::result::Result<String, ProviderFailure> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ProviderFailure::MalformedPayload("missing choices[0].message.content".into()))?;

    let answer = content.trim();
    if answer.is_empty() {
        return Err(ProviderFailure::MalformedPayload("empty answer content".into()));
    }
    Ok(answer.to_string())
}
