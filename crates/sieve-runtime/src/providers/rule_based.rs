//! Keyword provider. Always available, never fails.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use sieve_core::rules::screen_article;
use sieve_core::{Article, Criteria, JudgmentResult};

use super::factory::ProviderFactory;
use super::{Attempt, JudgmentProvider, ProviderError, ProviderOutcome};

pub const RULE_BASED_PROVIDER: &str = "rule-based";

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedProvider;

impl RuleBasedProvider {
    pub fn new() -> Self {
        Self
    }

    /// Judge without going through the provider interface.
    pub fn judge(&self, article: &Article, criteria: &Criteria) -> JudgmentResult {
        screen_article(article, criteria).result
    }
}

#[async_trait]
impl JudgmentProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        RULE_BASED_PROVIDER
    }

    async fn evaluate(
        &self,
        article: &Article,
        criteria: &Criteria,
        _attempt: Attempt,
    ) -> ProviderOutcome {
        ProviderOutcome::Success(self.judge(article, criteria))
    }
}

pub struct RuleBasedProviderFactory;

impl ProviderFactory for RuleBasedProviderFactory {
    fn provider_type(&self) -> &'static str {
        RULE_BASED_PROVIDER
    }

    fn create(&self, _config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
        Ok(Arc::new(RuleBasedProvider))
    }

    fn validate_config(&self, _config: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Deterministic keyword matching against the criteria"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::{ScreeningDecision, SAMPLE_CRITERIA_YAML};

    #[tokio::test]
    async fn test_always_succeeds() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let provider = RuleBasedProvider::new();

        for article in [
            Article::new("", ""),
            Article::new("A systematic review of aspirin", "We searched MEDLINE."),
        ] {
            let outcome = provider.evaluate(&article, &criteria, Attempt::first()).await;
            assert!(outcome.is_success());
        }
    }

    #[test]
    fn test_judge_excludes_review() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let article = Article::new(
            "Antiplatelet therapy after myocardial infarction: a systematic review",
            "We searched PubMed and pooled 12 trials.",
        );
        assert_eq!(
            RuleBasedProvider.judge(&article, &criteria).decision(),
            ScreeningDecision::Exclude
        );
    }
}
