//! Generative provider: prompt a chat model and parse its answer.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use sieve_core::{parse_judgment, Article, Criteria};

use super::{
    Attempt, CompletionConfig, FailureKind, JudgmentProvider, LlmClient, ProviderError,
    ProviderFailure, ProviderOutcome,
};
use crate::prompts::screening_messages;
use crate::resilience::RequestPacer;

/// Read the completion settings shared by generative factories.
///
/// `timeout` is a humantime string such as `"30s"`.
pub(crate) fn completion_config_from(
    config: &JsonValue,
    default_model: &str,
) -> Result<CompletionConfig, ProviderError> {
    let mut completion = CompletionConfig::new(config["model"].as_str().unwrap_or(default_model));

    if let Some(max_tokens) = config["max_tokens"].as_u64() {
        completion.max_tokens = max_tokens as u32;
    }

    if let Some(temperature) = config["temperature"].as_f64() {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ProviderError::NotConfigured(format!(
                "temperature must be in [0, 2], got {}",
                temperature
            )));
        }
        completion.temperature = temperature as f32;
    }

    match &config["timeout"] {
        JsonValue::Null => {}
        JsonValue::String(s) => {
            completion.timeout = humantime::parse_duration(s).map_err(|e| {
                ProviderError::NotConfigured(format!("invalid timeout '{}': {}", s, e))
            })?;
        }
        JsonValue::Number(n) => {
            let secs = n.as_u64().ok_or_else(|| {
                ProviderError::NotConfigured(format!("invalid timeout {}", n))
            })?;
            completion.timeout = Duration::from_secs(secs);
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "invalid timeout {}",
                other
            )))
        }
    }

    Ok(completion)
}

/// A judgment provider backed by a chat model.
///
/// After a parse failure the next attempt uses the strict prompt, which
/// asks for a bare JSON object.
pub struct GenerativeProvider {
    name: String,
    client: Arc<dyn LlmClient>,
    completion: CompletionConfig,
    pacer: Option<RequestPacer>,
}

impl GenerativeProvider {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn LlmClient>,
        completion: CompletionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            completion,
            pacer: None,
        }
    }

    /// Space requests out to respect a backend rate limit.
    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }
}

impl std::fmt::Debug for GenerativeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeProvider")
            .field("name", &self.name)
            .field("client", &self.client.name())
            .field("model", &self.completion.model)
            .field("paced", &self.pacer.is_some())
            .finish()
    }
}

#[async_trait]
impl JudgmentProvider for GenerativeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        article: &Article,
        criteria: &Criteria,
        attempt: Attempt,
    ) -> ProviderOutcome {
        let messages = screening_messages(article, criteria, attempt.after_parse_failure);

        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let response = match self.client.complete(messages, &self.completion).await {
            Ok(response) => response,
            Err(e) => return e.into_outcome(),
        };

        debug!(
            provider = %self.name,
            model = %response.model,
            attempt = attempt.number,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Completion received"
        );

        match parse_judgment(&response.content) {
            Ok(judgment) => ProviderOutcome::Success(judgment),
            Err(failure) => {
                ProviderFailure::new(FailureKind::ParseFailure, failure.to_string()).into_outcome()
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}
