//! Groq chat-completions client (OpenAI-compatible wire format).
//!
//! Requires the `groq` feature for network access; without it every call
//! returns [`ProviderError::NotConfigured`], which the engine treats as a
//! fatal failure and demotes past.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::factory::ProviderFactory;
use super::generative::{completion_config_from, GenerativeProvider};
use super::secrets::{ApiCredential, CredentialSource};
use super::{
    ChatMessage, CompletionConfig, CompletionResponse, JudgmentProvider, LlmClient, ProviderError,
};
#[cfg(feature = "groq")]
use super::TokenUsage;
use crate::resilience::RequestPacer;

pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Free-tier request ceiling.
pub const DEFAULT_CALLS_PER_MINUTE: u32 = 15;

pub struct GroqClient {
    credential: ApiCredential,
    base_url: String,
    #[cfg(feature = "groq")]
    http: reqwest::Client,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GroqClient {
    fn with_credential(
        credential: ApiCredential,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        #[cfg(not(feature = "groq"))]
        let _ = timeout;

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            #[cfg(feature = "groq")]
            http: super::http::build_client(timeout)?,
        })
    }

    /// Create a client from an explicit key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_credential(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Groq API key"),
            DEFAULT_GROQ_BASE_URL.to_string(),
            CompletionConfig::default().timeout,
        )
    }

    /// Create from provider config, falling back to `GROQ_API_KEY`.
    pub fn from_config(config: &JsonValue, timeout: Duration) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_config_or_env(config, "api_key", GROQ_API_KEY_ENV, "Groq API key")?;
        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_GROQ_BASE_URL)
            .to_string();
        Self::with_credential(credential, base_url, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(not(feature = "groq"), allow(dead_code))]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "groq"), allow(dead_code))]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "groq"), allow(dead_code))]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "groq"), allow(dead_code))]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "groq"), allow(dead_code))]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmClient for GroqClient {
    #[cfg(feature = "groq")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        // Only expose the credential here, at the point of use
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| super::http::map_send_error(e, config.timeout))?;

        let response = super::http::check_status("groq", response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::ParseError("response has no message content".to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: body.model.unwrap_or_else(|| config.model.clone()),
            usage,
        })
    }

    #[cfg(not(feature = "groq"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Groq client requires the 'groq' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Factory for the Groq-backed generative provider.
///
/// Provider config:
/// ```json
/// {
///   "api_key": "gsk_...",                   // Optional, falls back to GROQ_API_KEY
///   "base_url": "https://...",              // Optional
///   "model": "llama-3.3-70b-versatile",     // Optional
///   "timeout": "30s",                       // Optional, per request
///   "calls_per_minute": 15                  // Optional, 0 disables pacing
/// }
/// ```
pub struct GroqProviderFactory;

impl ProviderFactory for GroqProviderFactory {
    fn provider_type(&self) -> &'static str {
        "groq"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
        let completion = completion_config_from(config, DEFAULT_GROQ_MODEL)?;
        let client = GroqClient::from_config(config, completion.timeout)?;

        let calls_per_minute = config["calls_per_minute"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_CALLS_PER_MINUTE);

        let mut provider = GenerativeProvider::new("groq", Arc::new(client), completion);
        if calls_per_minute > 0 {
            provider = provider.with_pacer(RequestPacer::per_minute(calls_per_minute));
        }
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", GROQ_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Groq API key required: set 'api_key' in config or {} env",
                GROQ_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        completion_config_from(config, DEFAULT_GROQ_MODEL).map(|_| ())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "model": DEFAULT_GROQ_MODEL,
            "calls_per_minute": DEFAULT_CALLS_PER_MINUTE
        })
    }

    fn description(&self) -> &'static str {
        "Groq-hosted generative model (OpenAI-compatible API)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GroqClient::new("test-key").unwrap();
        assert_eq!(client.name(), "groq");
        assert_eq!(client.base_url(), DEFAULT_GROQ_BASE_URL);
    }

    #[test]
    fn test_from_config_with_api_key() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.example.com/v1/"
        });

        let client = GroqClient::from_config(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://custom.example.com/v1");
        assert_eq!(client.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "gsk-super-secret-key-12345";
        let client = GroqClient::new(secret_key).unwrap();
        let debug_output = format!("{:?}", client);

        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(GroqClient::new("key").unwrap().health_check().await);
        assert!(!GroqClient::new("").unwrap().health_check().await);
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let factory = GroqProviderFactory;
        let provider = factory
            .create(&serde_json::json!({ "api_key": "test-api-key" }))
            .unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let config = serde_json::json!({
            "api_key": "test-key",
            "base_url": "invalid-url"
        });
        assert!(GroqProviderFactory.validate_config(&config).is_err());
    }

    #[test]
    fn test_factory_default_config() {
        let config = GroqProviderFactory.default_config();
        assert_eq!(config["model"], DEFAULT_GROQ_MODEL);
        assert_eq!(config["calls_per_minute"], 15);
    }
}
