//! # sieve-core
//!
//! Deterministic building blocks for screening research articles against
//! inclusion/exclusion criteria.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the rule-based screener gives the same judgment for
//!    the same article and criteria
//! 2. **Bounded**: every [`JudgmentResult`] has confidence in `[0, 1]`
//! 3. **Traceable**: rule-based judgments cite the matched terms and spans
//! 4. **No network**: model calls live in `sieve-runtime`
//!
//! ## Example
//!
//! ```rust,ignore
//! use sieve_core::{evaluate, Article, Criteria};
//!
//! let criteria = Criteria::from_yaml_file("criteria.yaml")?;
//! let article = Article::new("Aspirin in STEMI", "A randomized, double-blind trial...");
//! let decision = evaluate(&article, &criteria, 0.7);
//!
//! println!("{}: {:.2}", decision.result.decision(), decision.result.confidence());
//! ```

pub mod criteria;
pub mod evidence;
pub mod normalizer;
pub mod response;
pub mod rules;
pub mod types;

// Re-export main types at crate root
pub use criteria::{Criteria, CriteriaError, SAMPLE_CRITERIA_YAML};
pub use evidence::{ArticleField, MatchKind, TermMatch};
pub use normalizer::{DecisionNormalizer, NormalizedDecision, DEFAULT_CONFIDENCE_THRESHOLD};
pub use response::{parse_judgment, ParseFailure};
pub use rules::{RuleJudgment, RuleScreener};
pub use types::{
    clamp_confidence, Article, ArticleError, JudgmentResult, ScreeningDecision, ScreeningRecord,
};

/// Screen an article with the rule-based screener and apply the
/// confidence threshold.
pub fn evaluate(article: &Article, criteria: &Criteria, threshold: f64) -> NormalizedDecision {
    let judgment = rules::screen_article(article, criteria);
    DecisionNormalizer::new(threshold).normalize(judgment.result)
}
