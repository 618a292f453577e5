//! Decision normalizer: applies the confidence-threshold policy.
//!
//! The policy is fixed:
//! 1. INCLUDE/EXCLUDE below the threshold → MAYBE, reasoning annotated
//! 2. INCLUDE/EXCLUDE at or above the threshold → unchanged
//! 3. MAYBE → unchanged, whatever its confidence
//!
//! A judgment is never upgraded.

use serde::{Deserialize, Serialize};

use crate::types::{clamp_confidence, JudgmentResult, ScreeningDecision};

/// Default minimum confidence for a definite decision.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// A judgment after the threshold policy has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDecision {
    pub result: JudgmentResult,

    /// The decision the provider actually made
    pub provider_decision: ScreeningDecision,

    /// Whether the threshold turned a definite decision into MAYBE
    pub downgraded: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionNormalizer {
    threshold: f64,
}

impl DecisionNormalizer {
    /// Create a normalizer. The threshold is clamped into `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: clamp_confidence(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn normalize(&self, judgment: JudgmentResult) -> NormalizedDecision {
        let provider_decision = judgment.decision();

        if provider_decision.is_definite() && judgment.confidence() < self.threshold {
            let (decision, confidence, reasoning) = judgment.into_parts();
            let annotated = format!(
                "{} [below confidence threshold {:.2}: {} at {:.2}]",
                reasoning, self.threshold, decision, confidence
            );
            return NormalizedDecision {
                result: JudgmentResult::new(ScreeningDecision::Maybe, confidence, annotated),
                provider_decision,
                downgraded: true,
            };
        }

        NormalizedDecision {
            result: judgment,
            provider_decision,
            downgraded: false,
        }
    }
}

impl Default for DecisionNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_below_threshold_becomes_maybe() {
        let normalizer = DecisionNormalizer::default();
        let out = normalizer.normalize(JudgmentResult::new(
            ScreeningDecision::Include,
            0.55,
            "Two keywords matched",
        ));

        assert!(out.downgraded);
        assert_eq!(out.provider_decision, ScreeningDecision::Include);
        assert_eq!(out.result.decision(), ScreeningDecision::Maybe);
        assert_eq!(out.result.confidence(), 0.55);
        assert!(out.result.reasoning().starts_with("Two keywords matched"));
        assert!(out.result.reasoning().contains("below confidence threshold 0.70"));
    }

    #[test]
    fn test_at_threshold_passes() {
        let normalizer = DecisionNormalizer::new(0.7);
        let judgment = JudgmentResult::new(ScreeningDecision::Exclude, 0.7, "review");
        let out = normalizer.normalize(judgment.clone());
        assert!(!out.downgraded);
        assert_eq!(out.result, judgment);
    }

    #[test]
    fn test_maybe_passes_regardless() {
        let normalizer = DecisionNormalizer::new(0.9);
        let judgment = JudgmentResult::new(ScreeningDecision::Maybe, 0.1, "unclear");
        assert_eq!(normalizer.normalize(judgment.clone()).result, judgment);
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(DecisionNormalizer::new(1.5).threshold(), 1.0);
        assert_eq!(DecisionNormalizer::new(-1.0).threshold(), 0.0);
    }

    fn any_decision() -> impl Strategy<Value = ScreeningDecision> {
        prop_oneof![
            Just(ScreeningDecision::Include),
            Just(ScreeningDecision::Exclude),
            Just(ScreeningDecision::Maybe),
        ]
    }

    proptest! {
        #[test]
        fn normalizer_downgrades_iff_below_threshold(
            decision in any_decision(),
            confidence in 0.0f64..=1.0,
            threshold in 0.0f64..=1.0,
        ) {
            let normalizer = DecisionNormalizer::new(threshold);
            let out = normalizer.normalize(JudgmentResult::new(decision, confidence, "r"));

            let expect_downgrade = decision != ScreeningDecision::Maybe && confidence < threshold;
            prop_assert_eq!(out.downgraded, expect_downgrade);

            if expect_downgrade {
                prop_assert_eq!(out.result.decision(), ScreeningDecision::Maybe);
            } else {
                prop_assert_eq!(out.result.decision(), decision);
            }
            prop_assert_eq!(out.result.confidence(), confidence);
        }

        #[test]
        fn normalizer_never_upgrades_maybe(
            confidence in 0.0f64..=1.0,
            threshold in 0.0f64..=1.0,
        ) {
            let normalizer = DecisionNormalizer::new(threshold);
            let out = normalizer.normalize(JudgmentResult::new(ScreeningDecision::Maybe, confidence, "r"));
            prop_assert_eq!(out.result.decision(), ScreeningDecision::Maybe);
            prop_assert!(!out.downgraded);
        }
    }
}
