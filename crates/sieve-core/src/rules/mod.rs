//! Deterministic keyword screening.
//!
//! The rule-based screener is the last line of the fallback chain, so it
//! must never fail: every input produces a judgment.
//!
//! ## Scoring
//!
//! 1. Any exclusion hit → EXCLUDE. Confidence is `0.6 + 0.1 × weight`,
//!    capped at 0.95; study types weigh 2, exclusion keywords 1.
//! 2. Otherwise, at least half the inclusion terms matched → INCLUDE with
//!    confidence equal to the matched fraction (capped at 0.95).
//! 3. Some inclusion terms matched → MAYBE at 0.5.
//! 4. Nothing matched → MAYBE at 0.3.

pub mod patterns;

use regex::Regex;

use crate::criteria::Criteria;
use crate::evidence::{ArticleField, MatchKind, TermMatch};
use crate::types::{Article, JudgmentResult, ScreeningDecision};
use patterns::{family_for, ConceptFamily};

const CONFIDENCE_CEILING: f64 = 0.95;
const EXCLUDE_BASE_CONFIDENCE: f64 = 0.6;
const EXCLUDE_STEP: f64 = 0.1;
const INCLUDE_MIN_FRACTION: f64 = 0.5;
const PARTIAL_MATCH_CONFIDENCE: f64 = 0.5;
const NO_SIGNAL_CONFIDENCE: f64 = 0.3;
const STUDY_TYPE_WEIGHT: u32 = 2;
const KEYWORD_WEIGHT: u32 = 1;
const MAX_REASONS: usize = 3;

/// A compiled criteria term.
///
/// `"STEMI/NSTEMI"` compiles to two literal alternatives; terms that name a
/// concept family also match that family's phrasings.
pub struct TermMatcher {
    term: String,
    alternatives: Vec<Regex>,
    family: Option<&'static ConceptFamily>,
}

impl TermMatcher {
    pub fn compile(term: &str) -> Self {
        let parts: Vec<&str> = term.split('/').map(str::trim).collect();
        let parts = if parts.len() > 1 && parts.iter().all(|p| !p.is_empty()) {
            parts
        } else {
            vec![term.trim()]
        };

        let family = family_for(term).or_else(|| parts.iter().find_map(|p| family_for(p)));
        let alternatives = parts.iter().filter_map(|p| literal_regex(p)).collect();

        Self {
            term: term.to_string(),
            alternatives,
            family,
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Find the term in the article, title first.
    pub fn find(&self, article: &Article) -> Option<TermMatch> {
        let fields = [
            (ArticleField::Title, article.title.as_str()),
            (ArticleField::Abstract, article.abstract_text.as_str()),
        ];

        for (field, text) in fields {
            if let Some(m) = self.alternatives.iter().filter_map(|re| re.find(text)).min_by_key(|m| m.start()) {
                return Some(TermMatch::new(
                    &self.term,
                    field,
                    text,
                    m.start(),
                    m.end(),
                    MatchKind::Literal,
                ));
            }
            if let Some(family) = self.family {
                if let Some((start, end)) = family.find(text) {
                    return Some(TermMatch::new(
                        &self.term,
                        field,
                        text,
                        start,
                        end,
                        MatchKind::Concept(family.name.to_string()),
                    ));
                }
            }
        }

        None
    }
}

/// Case-insensitive, word-bounded regex for a literal phrase.
fn literal_regex(phrase: &str) -> Option<Regex> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    let body = words.join(r"[\s-]+");
    let starts_word = phrase.chars().next().map(char::is_alphanumeric).unwrap_or(false);
    let ends_word = phrase.chars().last().map(char::is_alphanumeric).unwrap_or(false);

    let pattern = format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" }
    );

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(phrase = %phrase, error = %e, "Skipping unmatchable criteria term");
            None
        }
    }
}

/// A rule-based judgment together with the matches behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleJudgment {
    pub result: JudgmentResult,
    pub inclusion_matches: Vec<TermMatch>,
    pub exclusion_matches: Vec<TermMatch>,
}

/// Keyword screener compiled from one set of criteria.
pub struct RuleScreener {
    inclusion: Vec<TermMatcher>,
    exclusion: Vec<(TermMatcher, u32)>,
}

impl RuleScreener {
    pub fn new(criteria: &Criteria) -> Self {
        let inclusion = criteria
            .inclusion_terms()
            .iter()
            .map(|t| TermMatcher::compile(t))
            .collect();

        let exclusion = criteria
            .exclusion_terms()
            .iter()
            .map(|t| (TermMatcher::compile(t), KEYWORD_WEIGHT))
            .chain(
                criteria
                    .study_types_exclude
                    .iter()
                    .map(|t| (TermMatcher::compile(t), STUDY_TYPE_WEIGHT)),
            )
            .collect();

        Self {
            inclusion,
            exclusion,
        }
    }

    /// Judge one article. Never fails.
    pub fn screen(&self, article: &Article) -> RuleJudgment {
        let inclusion_matches: Vec<TermMatch> =
            self.inclusion.iter().filter_map(|m| m.find(article)).collect();

        let mut exclusion_weight = 0u32;
        let mut exclusion_matches = Vec::new();
        for (matcher, weight) in &self.exclusion {
            if let Some(m) = matcher.find(article) {
                exclusion_weight += weight;
                exclusion_matches.push(m);
            }
        }

        let result = if exclusion_weight > 0 {
            let confidence = (EXCLUDE_BASE_CONFIDENCE + EXCLUDE_STEP * f64::from(exclusion_weight))
                .min(CONFIDENCE_CEILING);
            JudgmentResult::new(
                ScreeningDecision::Exclude,
                confidence,
                format!("Exclusion terms: {}", summarize(&exclusion_matches)),
            )
        } else {
            let total = self.inclusion.len();
            let hits = inclusion_matches.len();
            let fraction = if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            };

            if hits > 0 && fraction >= INCLUDE_MIN_FRACTION {
                JudgmentResult::new(
                    ScreeningDecision::Include,
                    fraction.min(CONFIDENCE_CEILING),
                    format!(
                        "Matched {} of {} inclusion terms: {}",
                        hits,
                        total,
                        summarize(&inclusion_matches)
                    ),
                )
            } else if hits > 0 {
                JudgmentResult::new(
                    ScreeningDecision::Maybe,
                    PARTIAL_MATCH_CONFIDENCE,
                    format!(
                        "Partial match, {} of {} inclusion terms: {}",
                        hits,
                        total,
                        summarize(&inclusion_matches)
                    ),
                )
            } else {
                JudgmentResult::new(
                    ScreeningDecision::Maybe,
                    NO_SIGNAL_CONFIDENCE,
                    "No clear inclusion or exclusion signals",
                )
            }
        };

        tracing::debug!(
            article = %article.label(),
            decision = %result.decision(),
            confidence = result.confidence(),
            inclusion_hits = inclusion_matches.len(),
            exclusion_weight,
            "Rule-based judgment"
        );

        RuleJudgment {
            result,
            inclusion_matches,
            exclusion_matches,
        }
    }
}

fn summarize(matches: &[TermMatch]) -> String {
    let shown: Vec<String> = matches.iter().take(MAX_REASONS).map(|m| m.to_string()).collect();
    let mut summary = shown.join("; ");
    if matches.len() > MAX_REASONS {
        summary.push_str(&format!("; and {} more", matches.len() - MAX_REASONS));
    }
    summary
}

/// Screen one article against criteria in a single call.
pub fn screen_article(article: &Article, criteria: &Criteria) -> RuleJudgment {
    RuleScreener::new(criteria).screen(article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cardiac_criteria() -> Criteria {
        Criteria::from_yaml(
            r#"
inclusion_criteria:
  - "Randomized controlled trial"
  - "Patients with STEMI or NSTEMI"
exclusion_criteria:
  - "Systematic reviews"
include_keywords:
  - "randomized controlled trial"
  - "STEMI/NSTEMI"
exclude_keywords:
  - "systematic review"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rct_in_stemi_is_included() {
        let article = Article::new(
            "Aspirin loading in acute coronary care",
            "We conducted a randomized, double-blind trial of aspirin in STEMI patients.",
        );
        let judgment = screen_article(&article, &cardiac_criteria());

        assert_eq!(judgment.result.decision(), ScreeningDecision::Include);
        assert!(judgment.result.confidence() >= 0.6);
        assert_eq!(judgment.inclusion_matches.len(), 2);
        assert!(matches!(
            judgment.inclusion_matches[0].kind,
            MatchKind::Concept(ref f) if f == "randomized-trial"
        ));
    }

    #[test]
    fn test_systematic_review_is_excluded_despite_overlap() {
        let article = Article::new(
            "Antiplatelet therapy in STEMI: a systematic review",
            "We searched MEDLINE and Embase. This meta-analysis of 40 RCTs in STEMI \
             patients pooled randomized controlled trial data.",
        );
        let judgment = screen_article(&article, &cardiac_criteria());

        assert_eq!(judgment.result.decision(), ScreeningDecision::Exclude);
        assert!(!judgment.inclusion_matches.is_empty());
        assert_eq!(judgment.exclusion_matches[0].field, ArticleField::Title);
    }

    #[test]
    fn test_study_types_count_double() {
        let criteria = Criteria::from_yaml(
            r#"
inclusion_criteria: ["Aspirin"]
exclusion_criteria: []
include_keywords: ["aspirin"]
exclude_keywords: ["mice"]
study_types_exclude: ["case series"]
"#,
        )
        .unwrap();

        let keyword_only = Article::new("Aspirin in mice", "");
        let study_type = Article::new("Aspirin: a case series", "");

        let a = screen_article(&keyword_only, &criteria).result;
        let b = screen_article(&study_type, &criteria).result;
        assert!((a.confidence() - 0.7).abs() < 1e-9);
        assert!((b.confidence() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_partial_and_no_signal() {
        let criteria = Criteria::from_yaml(
            r#"
inclusion_criteria: ["x"]
exclusion_criteria: []
include_keywords: ["aspirin", "clopidogrel", "ticagrelor"]
exclude_keywords: []
"#,
        )
        .unwrap();

        let partial = screen_article(&Article::new("Aspirin dosing", ""), &criteria).result;
        assert_eq!(partial.decision(), ScreeningDecision::Maybe);
        assert_eq!(partial.confidence(), 0.5);

        let none = screen_article(&Article::new("Statin adherence", ""), &criteria).result;
        assert_eq!(none.decision(), ScreeningDecision::Maybe);
        assert_eq!(none.confidence(), 0.3);
    }

    #[test]
    fn test_word_boundaries() {
        let matcher = TermMatcher::compile("male");
        assert!(matcher.find(&Article::new("Female patients", "")).is_none());
        assert!(matcher.find(&Article::new("Male patients", "")).is_some());
    }

    #[test]
    fn test_hyphen_and_space_interchangeable() {
        let matcher = TermMatcher::compile("in vitro");
        assert!(matcher.find(&Article::new("", "an in-vitro assay")).is_some());
    }

    #[test]
    fn test_punctuated_term_compiles() {
        let matcher = TermMatcher::compile("(RCT)");
        assert!(matcher.find(&Article::new("", "a trial (RCT) of")).is_some());
    }

    proptest! {
        #[test]
        fn rule_screening_is_deterministic_and_bounded(
            title in "[a-zA-Z ,.]{0,80}",
            abstract_text in "[a-zA-Z ,.-]{0,200}",
        ) {
            let criteria = cardiac_criteria();
            let article = Article::new(title, abstract_text);
            let first = screen_article(&article, &criteria);
            let second = screen_article(&article, &criteria);

            prop_assert_eq!(&first, &second);
            prop_assert!((0.0..=1.0).contains(&first.result.confidence()));
        }
    }
}
