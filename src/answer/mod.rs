//! Question answering through an ordered chain of providers.
//!
//! Providers are tried in priority order, each exactly once. Provider
//! failures never reach the caller: when every provider fails, or none is
//! configured, a static fallback answer is returned instead.

use crate::config::{ProviderConfig, PRIMARY_KEY_VAR, SECONDARY_KEY_VAR};
use crate::error::{Result, ServiceError};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

pub mod provider;

pub use provider::{AnswerProvider, ChatCompletionsProvider, ProviderFailure, SYSTEM_PROMPT};

/// A caller's question, guaranteed non-blank and stored trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    /// Validates and trims the raw text
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ServiceError::Validation("问题不能为空".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The trimmed question text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produced an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// A configured provider, by name
    Provider(String),
    /// The static fallback text
    Fallback,
}

impl AnswerSource {
    /// Short label for responses and logs
    pub fn label(&self) -> &str {
        match self {
            Self::Provider(name) => name,
            Self::Fallback => "fallback",
        }
    }
}

/// Answer text plus its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerResult {
    /// Text returned to the caller
    pub answer: String,
    /// Provider or fallback that produced the text
    pub source: AnswerSource,
}

impl AnswerResult {
    /// Whether the static fallback was used
    pub fn is_fallback(&self) -> bool {
        self.source == AnswerSource::Fallback
    }
}

/// Routes questions through the configured providers
pub struct AnswerService {
    providers: Vec<Box<dyn AnswerProvider>>,
}

impl AnswerService {
    /// Creates a service over providers already in priority order
    pub fn new(providers: Vec<Box<dyn AnswerProvider>>) -> Self {
        Self { providers }
    }

    /// Builds chat-completions providers from resolved configuration
    pub fn from_configs(configs: Vec<ProviderConfig>) -> Result<Self> {
        let providers = configs
            .into_iter()
            .map(|config| {
                ChatCompletionsProvider::new(config)
                    .map(|provider| Box::new(provider) as Box<dyn AnswerProvider>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(providers))
    }

    /// Whether at least one provider is configured
    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Produces exactly one answer for the question
    pub async fn answer(&self, question: &Question) -> AnswerResult {
        if self.providers.is_empty() {
            info!("No answer provider configured, returning fallback answer");
            return fallback_result(question);
        }

        for provider in &self.providers {
            let started = Instant::now();
            match provider.ask(question).await {
                Ok(answer) => {
                    info!(
                        provider = provider.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Provider answered"
                    );
                    return AnswerResult {
                        answer,
                        source: AnswerSource::Provider(provider.name().to_string()),
                    };
                }
                Err(failure) => {
                    warn!(
                        provider = provider.name(),
                        kind = failure.kind(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %failure,
                        "Provider failed, trying next"
                    );
                }
            }
        }

        warn!("All answer providers failed, returning fallback answer");
        fallback_result(question)
    }
}

fn fallback_result(question: &Question) -> AnswerResult {
    AnswerResult {
        answer: fallback_answer(question),
        source: AnswerSource::Fallback,
    }
}

/// Static answer used when no provider could respond
pub fn fallback_answer(question: &Question) -> String {
    format!(
        "关于您的问题「{question}」：\n\n\
         AI 问答服务当前不可用，暂时无法生成详细回答。\n\n\
         如需启用智能问答，请配置以下任一 API 密钥环境变量后重启服务：\n\
         - {PRIMARY_KEY_VAR}（主服务）\n\
         - {SECONDARY_KEY_VAR}（备用服务）\n\n\
         在此期间，建议查阅相关材料手册、国家标准或咨询材料领域的专业人士。"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeProvider {
        name: &'static str,
        outcome: std::result::Result<&'static str, ProviderFailure>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn boxed(
            name: &'static str,
            outcome: std::result::Result<&'static str, ProviderFailure>,
        ) -> (Box<dyn AnswerProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                name,
                outcome,
                calls: Arc::clone(&calls),
            };
            (Box::new(provider), calls)
        }
    }

    #[async_trait]
    impl AnswerProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn ask(&self, _question: &Question) -> std::result::Result<String, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(String::from)
        }
    }

    fn question(text: &str) -> Question {
        Question::new(text).unwrap()
    }

    #[test]
    fn test_question_rejects_blank_input() {
        assert!(Question::new("").unwrap_err().is_validation());
        assert!(Question::new("  \n\t ").unwrap_err().is_validation());
        assert_eq!(question("  什么是黄铜？ ").as_str(), "什么是黄铜？");
    }

    #[tokio::test]
    async fn test_no_providers_returns_fallback() {
        let service = AnswerService::new(Vec::new());
        let result = service.answer(&question("什么是304不锈钢？")).await;

        assert!(!service.is_available());
        assert!(result.is_fallback());
        assert!(result.answer.contains("什么是304不锈钢？"));
        assert!(result.answer.contains("API"));
        assert!(result.answer.contains(PRIMARY_KEY_VAR));
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let (primary, primary_calls) = FakeProvider::boxed("deepseek", Ok("304不锈钢是一种奥氏体不锈钢…"));
        let (secondary, secondary_calls) = FakeProvider::boxed("openai", Ok("unused"));
        let service = AnswerService::new(vec![primary, secondary]);

        let result = service.answer(&question("什么是304不锈钢？")).await;

        assert_eq!(
            result,
            AnswerResult {
                answer: "304不锈钢是一种奥氏体不锈钢…".to_string(),
                source: AnswerSource::Provider("deepseek".to_string()),
            }
        );
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_secondary_used_when_primary_fails() {
        for failure in [
            ProviderFailure::Timeout,
            ProviderFailure::RateLimited,
            ProviderFailure::Status(503),
            ProviderFailure::MalformedPayload("no choices".into()),
            ProviderFailure::Network("connection reset".into()),
        ] {
            let (primary, primary_calls) = FakeProvider::boxed("deepseek", Err(failure));
            let (secondary, secondary_calls) = FakeProvider::boxed("openai", Ok("备用回答"));
            let service = AnswerService::new(vec![primary, secondary]);

            let result = service.answer(&question("铝合金的密度是多少？")).await;

            assert_eq!(result.answer, "备用回答");
            assert_eq!(result.source.label(), "openai");
            assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
            assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_all_failures_return_fallback() {
        let (primary, primary_calls) = FakeProvider::boxed("deepseek", Err(ProviderFailure::Timeout));
        let (secondary, secondary_calls) =
            FakeProvider::boxed("openai", Err(ProviderFailure::Unauthorized(401)));
        let service = AnswerService::new(vec![primary, secondary]);

        let result = service.answer(&question("碳纤维复合材料")).await;

        assert!(result.is_fallback());
        assert!(result.answer.contains("碳纤维复合材料"));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_configs_preserves_order() -> Result<()> {
        use std::time::Duration;

        let config = |name: &str| ProviderConfig {
            name: name.to_string(),
            endpoint: "https://example.com/v1/chat/completions".to_string(),
            api_key: "sk-test".to_string(),
            model: "m".to_string(),
            timeout: Duration::from_secs(1),
        };
        let service = AnswerService::from_configs(vec![config("deepseek"), config("openai")])?;

        assert!(service.is_available());
        assert_eq!(service.provider_names(), vec!["deepseek", "openai"]);
        Ok(())
    }
}
