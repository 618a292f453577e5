//! Provider factories and the registry that maps ids to them.
//!
//! The fallback chain is built from a list of provider ids. Each id is
//! resolved through the registry, so a new backend only needs a factory.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("groq", &serde_json::json!({ "model": "llama-3.1-8b-instant" }))?;
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use sieve_core::{Article, Criteria};

use super::{
    Attempt, FailureKind, JudgmentProvider, ProviderError, ProviderFailure, ProviderOutcome,
};

/// Creates judgment providers from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier, used as the provider id in the priority list.
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError>;

    /// Check `config` without building anything or touching the network.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Judgment provider"
    }
}

/// Provider ids mapped to the factories that build them.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `factory` under its `provider_type`, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
        self.factories
            .get(provider_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "No provider registered as '{}' (known: {:?})",
                    provider_type,
                    self.available_types()
                ))
            })?
            .create(config)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factories
            .get(provider_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("No provider registered as '{}'", provider_type))
            })?
            .validate_config(config)
    }

    /// Registered ids, sorted.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn description(&self, provider_type: &str) -> Option<&'static str> {
        self.factories.get(provider_type).map(|f| f.description())
    }

    pub fn default_config(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories
            .get(provider_type)
            .map(|f| f.default_config())
    }

    /// Registry with every built-in provider.
    ///
    /// Generative backends are always registered; without their cargo
    /// feature they fail every call with a configuration error.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::groq::GroqProviderFactory));
        registry.register(Arc::new(super::ollama::OllamaProviderFactory));
        registry.register(Arc::new(super::classifier::ClassifierProviderFactory));
        registry.register(Arc::new(super::rule_based::RuleBasedProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

/// Placeholder for a provider that could not be created.
///
/// It keeps its slot in the chain and fails fatally on every call, so the
/// chain demotes past it and records why.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    id: String,
    reason: String,
}

impl UnavailableProvider {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl JudgmentProvider for UnavailableProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn evaluate(
        &self,
        _article: &Article,
        _criteria: &Criteria,
        _attempt: Attempt,
    ) -> ProviderOutcome {
        ProviderOutcome::FatalFailure(ProviderFailure::new(
            FailureKind::Configuration,
            self.reason.clone(),
        ))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::JudgmentResult;
    use sieve_core::ScreeningDecision;

    struct MockProvider {
        name: String,
    }

    #[async_trait]
    impl JudgmentProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn evaluate(
            &self,
            _article: &Article,
            _criteria: &Criteria,
            _attempt: Attempt,
        ) -> ProviderOutcome {
            ProviderOutcome::Success(JudgmentResult::new(ScreeningDecision::Maybe, 0.5, "mock"))
        }
    }

    struct MockProviderFactory;

    impl ProviderFactory for MockProviderFactory {
        fn provider_type(&self) -> &'static str {
            "mock"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
            let name = config["name"].as_str().unwrap_or("mock-provider").to_string();
            Ok(Arc::new(MockProvider { name }))
        }

        fn validate_config(&self, _config: &JsonValue) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn test_registered_factory_builds_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        assert!(registry.has_provider("mock"));
        assert!(!registry.has_provider("unknown"));

        let provider = registry.create("mock", &serde_json::json!({"name": "test-mock"}));
        assert_eq!(provider.unwrap().name(), "test-mock");
    }

    #[test]
    fn test_unregistered_id_is_not_configured() {
        let registry = ProviderRegistry::new();

        match registry.create("unknown", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("No provider registered"));
            }
            other => panic!("Expected NotConfigured error, got {:?}", other.map(|p| p.name().to_string())),
        }
        assert!(registry.validate("unknown", &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_defaults_registered() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.available_types(),
            vec!["classifier", "groq", "ollama", "rule-based"]
        );
        assert!(registry.description("classifier").is_some());
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_fatal() {
        let provider = UnavailableProvider::new("groq", "no API key");
        let outcome = provider
            .evaluate(&Article::new("t", "a"), &sample_criteria(), Attempt::first())
            .await;
        assert!(matches!(
            outcome,
            ProviderOutcome::FatalFailure(ProviderFailure { kind: FailureKind::Configuration, .. })
        ));
        assert!(!provider.health_check().await);
    }

    fn sample_criteria() -> Criteria {
        Criteria::from_yaml(sieve_core::SAMPLE_CRITERIA_YAML).unwrap()
    }
}
