//! Ollama embedding client for the classifier.
//!
//! `POST {base_url}/api/embed` with `{model, input: [..]}`. Requires the
//! `ollama` feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::classifier::TextEncoder;
use super::ProviderError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Debug)]
pub struct OllamaEncoder {
    base_url: String,
    model: String,
    #[cfg(feature = "ollama")]
    http: reqwest::Client,
}

impl OllamaEncoder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        #[cfg(not(feature = "ollama"))]
        let _ = timeout;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            #[cfg(feature = "ollama")]
            http: super::http::build_client(timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl TextEncoder for OllamaEncoder {
    fn name(&self) -> &str {
        "ollama-embed"
    }

    #[cfg(feature = "ollama")]
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| super::http::map_send_error(e, super::ollama::DEFAULT_OLLAMA_TIMEOUT))?;

        let response = super::http::check_status("ollama-embed", response).await?;

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(body.embeddings)
    }

    #[cfg(not(feature = "ollama"))]
    async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Ollama encoder requires the 'ollama' feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_trims_base_url() {
        let encoder = OllamaEncoder::new(
            "http://localhost:11434/",
            DEFAULT_EMBEDDING_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(encoder.base_url(), "http://localhost:11434");
        assert_eq!(encoder.model(), DEFAULT_EMBEDDING_MODEL);
    }
}
