//! Fallback orchestrator.
//!
//! Providers are tried in priority order, each under the backoff
//! controller. A fatal outcome (including exhausted retries) demotes to the
//! next provider and is recorded as a [`FallbackEvent`]. When every
//! configured provider has failed, the rule-based provider answers; it
//! cannot fail, so a decision is always produced.
//!
//! ```text
//! Trying(0) ──fatal──▶ Trying(1) ──fatal──▶ … ──▶ Exhausted ──▶ rule-based
//!    │                    │
//!    └──success──▶ Succeeded ◀──success──┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use sieve_core::{
    Article, Criteria, DecisionNormalizer, JudgmentResult, ScreeningDecision, ScreeningRecord,
};

use crate::config::{ConfigError, ScreeningConfig};
use crate::providers::{
    FailureKind, JudgmentProvider, ProviderOutcome, ProviderRegistry, RuleBasedProvider,
    UnavailableProvider,
};
use crate::resilience::{BackoffController, BackoffPolicy};

/// A provider was skipped for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub provider: String,
    pub kind: FailureKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Final decision for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub decision: ScreeningDecision,
    pub confidence: f64,
    pub reasoning: String,

    /// Provider whose judgment was used
    pub provider: String,

    /// What that provider decided before thresholding
    pub provider_decision: ScreeningDecision,

    /// Whether the threshold turned a definite decision into MAYBE
    pub downgraded: bool,

    /// Providers skipped on the way, in order
    pub fallback_events: Vec<FallbackEvent>,
}

impl ScreeningOutcome {
    /// The record stored on the article.
    pub fn to_record(&self) -> ScreeningRecord {
        ScreeningRecord {
            decision: self.decision,
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
            provider: self.provider.clone(),
            screened_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
enum ChainState {
    Trying(usize),
    Succeeded {
        provider: String,
        judgment: JudgmentResult,
    },
    Exhausted,
}

/// Ordered provider chain with a rule-based last resort.
pub struct FallbackOrchestrator {
    providers: Vec<Arc<dyn JudgmentProvider>>,
    last_resort: RuleBasedProvider,
    controller: BackoffController,
    normalizer: DecisionNormalizer,
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("providers", &self.provider_names())
            .field("controller", &self.controller)
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

impl FallbackOrchestrator {
    pub fn builder() -> FallbackOrchestratorBuilder {
        FallbackOrchestratorBuilder::default()
    }

    /// Build the chain named by `config.provider_priority`.
    ///
    /// A provider whose factory fails keeps its slot as an
    /// [`UnavailableProvider`], so the failure shows up as a fallback event
    /// on every article rather than aborting the run.
    pub fn from_config(
        config: &ScreeningConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate(&registry.available_types())?;

        let mut builder = Self::builder()
            .backoff(config.backoff_policy())
            .confidence_threshold(config.confidence_threshold);

        for id in &config.provider_priority {
            let provider = match registry.create(id, &config.provider_config(id)) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(provider = %id, error = %e, "Provider unavailable, it will be skipped");
                    Arc::new(UnavailableProvider::new(id.clone(), e.to_string()))
                }
            };
            builder = builder.provider(provider);
        }

        Ok(builder.build())
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn JudgmentProvider>] {
        &self.providers
    }

    pub fn threshold(&self) -> f64 {
        self.normalizer.threshold()
    }

    /// Screen one article. Never fails.
    pub async fn screen(&self, article: &Article, criteria: &Criteria) -> ScreeningOutcome {
        let mut events = Vec::new();
        let mut state = ChainState::Trying(0);

        let (provider, judgment) = loop {
            state = match state {
                ChainState::Trying(index) if index >= self.providers.len() => ChainState::Exhausted,
                ChainState::Trying(index) => {
                    let provider = &self.providers[index];
                    debug!(provider = provider.name(), article = %article.label(), "Trying provider");

                    match self.controller.call(provider.as_ref(), article, criteria).await {
                        ProviderOutcome::Success(judgment) => ChainState::Succeeded {
                            provider: provider.name().to_string(),
                            judgment,
                        },
                        ProviderOutcome::FatalFailure(failure)
                        | ProviderOutcome::TransientFailure(failure) => {
                            warn!(
                                provider = provider.name(),
                                kind = %failure.kind,
                                reason = %failure.message,
                                article = %article.label(),
                                "Provider failed, falling back"
                            );
                            events.push(FallbackEvent {
                                provider: provider.name().to_string(),
                                kind: failure.kind,
                                reason: failure.message,
                                at: Utc::now(),
                            });
                            ChainState::Trying(index + 1)
                        }
                    }
                }
                ChainState::Exhausted => {
                    if !self.providers.is_empty() {
                        warn!(article = %article.label(), "All providers failed, using rule-based screening");
                    }
                    ChainState::Succeeded {
                        provider: self.last_resort.name().to_string(),
                        judgment: self.last_resort.judge(article, criteria),
                    }
                }
                ChainState::Succeeded { provider, judgment } => break (provider, judgment),
            };
        };

        let normalized = self.normalizer.normalize(judgment);
        let (decision, confidence, reasoning) = normalized.result.into_parts();

        info!(
            article = %article.label(),
            decision = %decision,
            confidence = confidence,
            provider = %provider,
            downgraded = normalized.downgraded,
            fallbacks = events.len(),
            "Article screened"
        );

        ScreeningOutcome {
            decision,
            confidence,
            reasoning,
            provider,
            provider_decision: normalized.provider_decision,
            downgraded: normalized.downgraded,
            fallback_events: events,
        }
    }
}

/// Builder for [`FallbackOrchestrator`].
#[derive(Default)]
pub struct FallbackOrchestratorBuilder {
    providers: Vec<Arc<dyn JudgmentProvider>>,
    backoff: BackoffPolicy,
    threshold: Option<f64>,
}

impl FallbackOrchestratorBuilder {
    /// Append a provider at the lowest priority so far.
    pub fn provider(mut self, provider: Arc<dyn JudgmentProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn build(self) -> FallbackOrchestrator {
        FallbackOrchestrator {
            providers: self.providers,
            last_resort: RuleBasedProvider::new(),
            controller: BackoffController::new(self.backoff),
            normalizer: self
                .threshold
                .map(DecisionNormalizer::new)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Attempt, ProviderFailure};
    use async_trait::async_trait;
    use sieve_core::SAMPLE_CRITERIA_YAML;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        outcome: ProviderOutcome,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, outcome: ProviderOutcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JudgmentProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate(&self, _: &Article, _: &Criteria, _: Attempt) -> ProviderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn fatal() -> ProviderOutcome {
        ProviderOutcome::FatalFailure(ProviderFailure::new(FailureKind::Authentication, "denied"))
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_fraction: 0.0,
        }
    }

    fn fixtures() -> (Article, Criteria) {
        (
            Article::new("Aspirin in STEMI", "A randomized, double-blind trial of aspirin in STEMI patients."),
            Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_empty_chain_uses_rule_based() {
        let (article, criteria) = fixtures();
        let outcome = FallbackOrchestrator::builder().build().screen(&article, &criteria).await;

        assert_eq!(outcome.provider, "rule-based");
        assert!(outcome.fallback_events.is_empty());
    }

    #[tokio::test]
    async fn test_success_short_circuits() {
        let first = Fixed::new(
            "first",
            ProviderOutcome::Success(JudgmentResult::new(ScreeningDecision::Exclude, 0.9, "no")),
        );
        let second = Fixed::new("second", fatal());
        let orchestrator = FallbackOrchestrator::builder()
            .provider(first.clone())
            .provider(second.clone())
            .build();

        let (article, criteria) = fixtures();
        let outcome = orchestrator.screen(&article, &criteria).await;

        assert_eq!(outcome.provider, "first");
        assert_eq!(outcome.decision, ScreeningDecision::Exclude);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_demotes_with_event() {
        let first = Fixed::new("first", fatal());
        let second = Fixed::new(
            "second",
            ProviderOutcome::Success(JudgmentResult::new(ScreeningDecision::Include, 0.8, "yes")),
        );
        let orchestrator = FallbackOrchestrator::builder()
            .provider(first.clone())
            .provider(second)
            .backoff(fast_backoff())
            .build();

        let (article, criteria) = fixtures();
        let outcome = orchestrator.screen(&article, &criteria).await;

        assert_eq!(outcome.provider, "second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.fallback_events.len(), 1);
        assert_eq!(outcome.fallback_events[0].provider, "first");
        assert_eq!(outcome.fallback_events[0].kind, FailureKind::Authentication);
    }

    #[tokio::test]
    async fn test_low_confidence_is_downgraded() {
        let only = Fixed::new(
            "only",
            ProviderOutcome::Success(JudgmentResult::new(ScreeningDecision::Include, 0.55, "weak")),
        );
        let orchestrator = FallbackOrchestrator::builder()
            .provider(only)
            .confidence_threshold(0.7)
            .build();

        let (article, criteria) = fixtures();
        let outcome = orchestrator.screen(&article, &criteria).await;

        assert_eq!(outcome.decision, ScreeningDecision::Maybe);
        assert_eq!(outcome.provider_decision, ScreeningDecision::Include);
        assert!(outcome.downgraded);
        assert!((outcome.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_from_config_keeps_unavailable_slot() {
        let config = ScreeningConfig {
            provider_priority: vec!["classifier".into(), "rule-based".into()],
            providers: [(
                "classifier".to_string(),
                serde_json::json!({ "encoder": "word2vec" }),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let orchestrator =
            FallbackOrchestrator::from_config(&config, &ProviderRegistry::with_defaults()).unwrap();
        assert_eq!(orchestrator.provider_names(), vec!["classifier", "rule-based"]);
    }

    #[test]
    fn test_from_config_rejects_unknown_id() {
        let config = ScreeningConfig {
            provider_priority: vec!["oracle".into()],
            ..Default::default()
        };
        assert!(FallbackOrchestrator::from_config(&config, &ProviderRegistry::with_defaults()).is_err());
    }

    #[test]
    fn test_outcome_to_record() {
        let outcome = ScreeningOutcome {
            decision: ScreeningDecision::Maybe,
            confidence: 0.4,
            reasoning: "unclear".into(),
            provider: "classifier".into(),
            provider_decision: ScreeningDecision::Maybe,
            downgraded: false,
            fallback_events: vec![],
        };
        let record = outcome.to_record();
        assert_eq!(record.provider, "classifier");
        assert_eq!(record.decision, ScreeningDecision::Maybe);
    }
}
