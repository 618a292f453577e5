//! Evidence linking for rule-based judgments.
//!
//! Every matched term points at the field and byte span that triggered it,
//! so a reviewer can check the call against the abstract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the article a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleField {
    Title,
    Abstract,
}

impl fmt::Display for ArticleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleField::Title => write!(f, "title"),
            ArticleField::Abstract => write!(f, "abstract"),
        }
    }
}

/// How a term was recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The keyword (or one of its slash alternatives) appeared as written
    Literal,

    /// A phrasing from the named concept family appeared
    Concept(String),
}

/// A criteria term found in an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMatch {
    /// The criteria term as written in the criteria file
    pub term: String,

    pub field: ArticleField,

    /// The matched text
    pub excerpt: String,

    /// Pointer to the location (e.g., "abstract[12:40]")
    pub pointer: String,

    pub kind: MatchKind,
}

impl TermMatch {
    /// Create a match from a span of `source`.
    pub fn new(
        term: impl Into<String>,
        field: ArticleField,
        source: &str,
        start: usize,
        end: usize,
        kind: MatchKind,
    ) -> Self {
        Self {
            term: term.into(),
            field,
            excerpt: source.get(start..end).unwrap_or_default().to_string(),
            pointer: format!("{}[{}:{}]", field, start, end),
            kind,
        }
    }
}

impl fmt::Display for TermMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MatchKind::Literal => write!(f, "'{}' ({})", self.term, self.pointer),
            MatchKind::Concept(family) => write!(
                f,
                "'{}' via {} \"{}\" ({})",
                self.term, family, self.excerpt, self.pointer
            ),
        }
    }
}
