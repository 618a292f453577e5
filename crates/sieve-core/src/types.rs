//! Core types shared by every screening component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The three possible screening outcomes.
///
/// Ordering is for display only (INCLUDE, EXCLUDE, MAYBE); it carries
/// no numeric meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreeningDecision {
    Include,
    Exclude,
    Maybe,
}

impl ScreeningDecision {
    /// All decisions in display order.
    pub const ALL: [ScreeningDecision; 3] = [
        ScreeningDecision::Include,
        ScreeningDecision::Exclude,
        ScreeningDecision::Maybe,
    ];

    /// Whether this is a definite INCLUDE/EXCLUDE call.
    pub fn is_definite(&self) -> bool {
        !matches!(self, ScreeningDecision::Maybe)
    }

    /// Parse a decision keyword, case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_uppercase().as_str() {
            "INCLUDE" => Some(ScreeningDecision::Include),
            "EXCLUDE" => Some(ScreeningDecision::Exclude),
            "MAYBE" => Some(ScreeningDecision::Maybe),
            _ => None,
        }
    }
}

impl fmt::Display for ScreeningDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreeningDecision::Include => write!(f, "INCLUDE"),
            ScreeningDecision::Exclude => write!(f, "EXCLUDE"),
            ScreeningDecision::Maybe => write!(f, "MAYBE"),
        }
    }
}

/// Clamp a confidence value into `[0, 1]`. NaN becomes `0.0`.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A judgment on one article: decision, confidence and reasoning.
///
/// Confidence is always within `[0, 1]`; the constructor clamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentResult {
    decision: ScreeningDecision,
    confidence: f64,
    reasoning: String,
}

impl JudgmentResult {
    pub fn new(decision: ScreeningDecision, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.into(),
        }
    }

    pub fn decision(&self) -> ScreeningDecision {
        self.decision
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Split into `(decision, confidence, reasoning)`.
    pub fn into_parts(self) -> (ScreeningDecision, f64, String) {
        (self.decision, self.confidence, self.reasoning)
    }
}

/// Errors when mutating an article.
#[derive(Error, Debug, PartialEq)]
pub enum ArticleError {
    #[error("Article '{0}' already has a screening result")]
    AlreadyScreened(String),
}

/// The result slot of an article, filled once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRecord {
    pub decision: ScreeningDecision,
    pub confidence: f64,
    pub reasoning: String,

    /// Provider whose judgment was accepted
    pub provider: String,

    pub screened_at: DateTime<Utc>,
}

/// A research article as supplied by the record-extraction side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Article {
    pub title: String,

    #[serde(rename = "abstract", default)]
    pub abstract_text: String,

    #[serde(default)]
    pub authors: String,

    #[serde(default)]
    pub journal: String,

    #[serde(default)]
    pub year: String,

    #[serde(default)]
    pub doi: String,

    #[serde(default)]
    pub pmid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScreeningRecord>,
}

impl Article {
    /// Create an article from title and abstract.
    pub fn new(title: impl Into<String>, abstract_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            ..Default::default()
        }
    }

    /// Set the DOI.
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = doi.into();
        self
    }

    /// Set the PubMed identifier.
    pub fn with_pmid(mut self, pmid: impl Into<String>) -> Self {
        self.pmid = pmid.into();
        self
    }

    /// Short identifier for logs: DOI, PMID, or a truncated title.
    pub fn label(&self) -> String {
        if !self.doi.is_empty() {
            return format!("doi:{}", self.doi);
        }
        if !self.pmid.is_empty() {
            return format!("pmid:{}", self.pmid);
        }
        let title: String = self.title.chars().take(60).collect();
        if title.len() < self.title.len() {
            format!("{}...", title)
        } else {
            title
        }
    }

    /// Whether a result has been recorded.
    pub fn is_screened(&self) -> bool {
        self.result.is_some()
    }

    /// Record the screening result. A second write is rejected.
    pub fn record(&mut self, record: ScreeningRecord) -> Result<(), ArticleError> {
        if self.result.is_some() {
            return Err(ArticleError::AlreadyScreened(self.label()));
        }
        self.result = Some(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(decision: ScreeningDecision) -> ScreeningRecord {
        ScreeningRecord {
            decision,
            confidence: 0.8,
            reasoning: "test".to_string(),
            provider: "rule-based".to_string(),
            screened_at: Utc::now(),
        }
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(JudgmentResult::new(ScreeningDecision::Include, 1.7, "").confidence(), 1.0);
        assert_eq!(JudgmentResult::new(ScreeningDecision::Include, -0.2, "").confidence(), 0.0);
        assert_eq!(JudgmentResult::new(ScreeningDecision::Maybe, f64::NAN, "").confidence(), 0.0);
    }

    #[test]
    fn test_decision_keywords() {
        assert_eq!(ScreeningDecision::from_keyword("include"), Some(ScreeningDecision::Include));
        assert_eq!(ScreeningDecision::from_keyword(" EXCLUDE "), Some(ScreeningDecision::Exclude));
        assert_eq!(ScreeningDecision::from_keyword("Maybe"), Some(ScreeningDecision::Maybe));
        assert_eq!(ScreeningDecision::from_keyword("perhaps"), None);
    }

    #[test]
    fn test_display_order() {
        let mut decisions = vec![
            ScreeningDecision::Maybe,
            ScreeningDecision::Include,
            ScreeningDecision::Exclude,
        ];
        decisions.sort();
        assert_eq!(decisions, ScreeningDecision::ALL.to_vec());
    }

    #[test]
    fn test_record_written_once() {
        let mut article = Article::new("Aspirin after STEMI", "A randomized trial");
        assert!(article.record(record(ScreeningDecision::Include)).is_ok());
        assert!(article.is_screened());

        let second = article.record(record(ScreeningDecision::Exclude));
        assert!(matches!(second, Err(ArticleError::AlreadyScreened(_))));
        assert_eq!(
            article.result.as_ref().map(|r| r.decision),
            Some(ScreeningDecision::Include)
        );
    }

    #[test]
    fn test_label_prefers_identifiers() {
        let article = Article::new("Title", "").with_pmid("123");
        assert_eq!(article.label(), "pmid:123");

        let article = article.with_doi("10.1000/xyz");
        assert_eq!(article.label(), "doi:10.1000/xyz");
    }

    #[test]
    fn test_abstract_serde_name() {
        let article: Article =
            serde_json::from_str(r#"{"title": "T", "abstract": "A"}"#).unwrap();
        assert_eq!(article.abstract_text, "A");
        assert!(article.result.is_none());
    }
}
