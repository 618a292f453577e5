//! Local Ollama chat client.
//!
//! Talks to `POST {base_url}/api/chat` with streaming disabled. No
//! credential is needed. Requires the `ollama` feature for network access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::factory::ProviderFactory;
use super::generative::{completion_config_from, GenerativeProvider};
use super::{
    ChatMessage, CompletionConfig, CompletionResponse, JudgmentProvider, LlmClient, ProviderError,
};
#[cfg(feature = "ollama")]
use super::TokenUsage;

pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gpt-oss:20b";

/// Local models are slow on CPU; allow more time than remote ones.
pub const DEFAULT_OLLAMA_TIMEOUT: Duration = Duration::from_secs(120);

/// Base URL from config, then `OLLAMA_BASE_URL`, then the default.
pub fn resolve_base_url(config: &JsonValue) -> String {
    config["base_url"]
        .as_str()
        .map(str::to_string)
        .or_else(|| std::env::var(OLLAMA_BASE_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    #[cfg(feature = "ollama")]
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        #[cfg(not(feature = "ollama"))]
        let _ = timeout;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            #[cfg(feature = "ollama")]
            http: super::http::build_client(timeout)?,
        })
    }

    pub fn from_config(config: &JsonValue, timeout: Duration) -> Result<Self, ProviderError> {
        Self::new(resolve_base_url(config), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    #[cfg(feature = "ollama")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = OllamaChatRequest {
            model: &config.model,
            messages: &messages,
            stream: false,
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| super::http::map_send_error(e, config.timeout))?;

        let response = super::http::check_status("ollama", response).await?;

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(CompletionResponse {
            content: body.message.content,
            model: body.model.unwrap_or_else(|| config.model.clone()),
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
            },
        })
    }

    #[cfg(not(feature = "ollama"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Ollama client requires the 'ollama' feature".to_string(),
        ))
    }

    #[cfg(feature = "ollama")]
    async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(base_url = %self.base_url, error = %e, "Ollama not reachable");
                false
            }
        }
    }

    #[cfg(not(feature = "ollama"))]
    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Factory for the Ollama-backed generative provider.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://localhost:11434",   // Optional, falls back to OLLAMA_BASE_URL
///   "model": "gpt-oss:20b",                 // Optional
///   "timeout": "120s"                       // Optional, per request
/// }
/// ```
pub struct OllamaProviderFactory;

impl ProviderFactory for OllamaProviderFactory {
    fn provider_type(&self) -> &'static str {
        "ollama"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
        let mut completion = completion_config_from(config, DEFAULT_OLLAMA_MODEL)?;
        if config["timeout"].is_null() {
            completion.timeout = DEFAULT_OLLAMA_TIMEOUT;
        }
        let client = OllamaClient::from_config(config, completion.timeout)?;
        Ok(Arc::new(GenerativeProvider::new(
            "ollama",
            Arc::new(client),
            completion,
        )))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        let url = resolve_base_url(config);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
        completion_config_from(config, DEFAULT_OLLAMA_MODEL).map(|_| ())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": DEFAULT_OLLAMA_BASE_URL,
            "model": DEFAULT_OLLAMA_MODEL
        })
    }

    fn description(&self) -> &'static str {
        "Local generative model served by Ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_config_wins() {
        let config = serde_json::json!({ "base_url": "http://gpu-box:11434/" });
        assert_eq!(resolve_base_url(&config), "http://gpu-box:11434");
    }

    #[test]
    fn test_factory_creates_named_provider() {
        let provider = OllamaProviderFactory
            .create(&serde_json::json!({ "base_url": "http://localhost:11434" }))
            .unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_factory_rejects_bad_url() {
        let config = serde_json::json!({ "base_url": "localhost:11434" });
        assert!(OllamaProviderFactory.validate_config(&config).is_err());
    }

    #[test]
    fn test_factory_rejects_bad_timeout() {
        let config = serde_json::json!({ "base_url": "http://localhost:11434", "timeout": "soon" });
        assert!(OllamaProviderFactory.validate_config(&config).is_err());
    }
}
