//! Judgment providers and the backends they talk to.
//!
//! A [`JudgmentProvider`] turns one article into a [`ProviderOutcome`].
//! Generative providers sit on top of an [`LlmClient`] (chat completion);
//! the classifier sits on top of a [`TextEncoder`](classifier::TextEncoder).
//!
//! ## Security
//!
//! API keys are held in an [`ApiCredential`] from load until the request
//! header is set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use sieve_core::{Article, Criteria, JudgmentResult};

pub mod classifier;
pub mod embedding;
mod factory;
pub mod generative;
pub mod groq;
#[cfg(any(feature = "groq", feature = "ollama"))]
mod http;
pub mod ollama;
pub mod rule_based;
pub mod secrets;

pub use classifier::{ClassifierProvider, LexicalEncoder, TextEncoder};
pub use embedding::OllamaEncoder;
pub use factory::{ProviderFactory, ProviderRegistry, UnavailableProvider};
pub use generative::GenerativeProvider;
pub use groq::GroqClient;
pub use ollama::OllamaClient;
pub use rule_based::RuleBasedProvider;
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from LLM and embedding backends.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// The failure kind this error is reported as.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::HttpError(_) => FailureKind::Network,
            ProviderError::RateLimited { .. } => FailureKind::RateLimited,
            ProviderError::ApiError { status: 502..=504, .. } => FailureKind::ServerError,
            ProviderError::ApiError { status: 401 | 403, .. } => FailureKind::Authentication,
            ProviderError::ApiError { .. } => FailureKind::Rejected,
            ProviderError::ParseError(_) => FailureKind::MalformedResponse,
            ProviderError::AuthError => FailureKind::Authentication,
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::NotConfigured(_) => FailureKind::Configuration,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Classify this error into a provider outcome.
    pub fn into_outcome(self) -> ProviderOutcome {
        ProviderFailure::new(self.kind(), self.to_string()).into_outcome()
    }
}

/// Why a provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    RateLimited,
    ServerError,
    MalformedResponse,
    /// Model output had no unambiguous decision or confidence
    ParseFailure,
    Authentication,
    Configuration,
    /// The backend refused the request (any other non-success status)
    Rejected,
    RetriesExhausted,
}

impl FailureKind {
    /// Whether a retry of the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Network
                | FailureKind::Timeout
                | FailureKind::RateLimited
                | FailureKind::ServerError
                | FailureKind::MalformedResponse
                | FailureKind::ParseFailure
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::ServerError => "server-error",
            FailureKind::MalformedResponse => "malformed-response",
            FailureKind::ParseFailure => "parse-failure",
            FailureKind::Authentication => "authentication",
            FailureKind::Configuration => "configuration",
            FailureKind::Rejected => "rejected",
            FailureKind::RetriesExhausted => "retries-exhausted",
        };
        write!(f, "{}", s)
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap as transient or fatal according to the kind.
    pub fn into_outcome(self) -> ProviderOutcome {
        if self.kind.is_transient() {
            ProviderOutcome::TransientFailure(self)
        } else {
            ProviderOutcome::FatalFailure(self)
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success(JudgmentResult),
    TransientFailure(ProviderFailure),
    FatalFailure(ProviderFailure),
}

impl ProviderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success(_))
    }
}

/// Which attempt of a retried call this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,

    /// Set once an earlier attempt could not be parsed
    pub after_parse_failure: bool,
}

impl Attempt {
    pub fn first() -> Self {
        Self {
            number: 1,
            after_parse_failure: false,
        }
    }
}

/// A backend that can judge an article against criteria.
///
/// Implementations must not mutate the article or the criteria and must
/// classify their own failures.
#[async_trait]
pub trait JudgmentProvider: Send + Sync {
    /// Stable identifier, used in logs and fallback events.
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        article: &Article,
        criteria: &Criteria,
        attempt: Attempt,
    ) -> ProviderOutcome;

    /// Check whether the backend looks usable, without judging anything.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Per-request settings for a chat backend.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    /// Reply length cap
    pub max_tokens: u32,

    /// Sampling temperature, kept low for screening
    pub temperature: f32,

    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: groq::DEFAULT_GROQ_MODEL.to_string(),
            max_tokens: 500,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One turn of a screening conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system` or `user`
    pub role: String,

    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Raw reply text plus what the backend reported about it.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,

    pub model: String,

    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Chat-completion backend.
///
/// This is the only place generative calls leave the process.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if the backend is reachable or credentialed.
    async fn health_check(&self) -> bool;

    fn name(&self) -> &str;
}
