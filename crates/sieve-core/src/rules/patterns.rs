//! Biomedical concept families used by the rule-based screener.
//!
//! A keyword that names a concept (for example "randomized controlled
//! trial") also matches the common ways abstracts phrase that concept
//! ("a randomized, double-blind trial"). Keywords outside every family are
//! matched literally.

use lazy_static::lazy_static;
use regex::Regex;

/// A named group of phrasings for one study concept.
pub struct ConceptFamily {
    pub name: &'static str,

    /// Normalized keywords that select this family
    pub triggers: &'static [&'static str],

    /// Case-insensitive phrasings that count as a mention
    pub patterns: Vec<Regex>,
}

impl ConceptFamily {
    fn new(name: &'static str, triggers: &'static [&'static str], patterns: &[&str]) -> Self {
        Self {
            name,
            triggers,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).expect("concept pattern is valid"))
                .collect(),
        }
    }

    /// First match of any phrasing in `text`, as a byte span.
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        self.patterns
            .iter()
            .filter_map(|p| p.find(text))
            .map(|m| (m.start(), m.end()))
            .min()
    }
}

lazy_static! {
    /// Randomized controlled trials
    pub static ref RCT_FAMILY: ConceptFamily = ConceptFamily::new(
        "randomized-trial",
        &[
            "randomized controlled trial",
            "randomised controlled trial",
            "randomized trial",
            "randomised trial",
            "rct",
        ],
        &[
            r"\brandomi[sz]ed\b[^.]{0,40}?\btrials?\b",
            r"\bdouble[\s-]+blind(?:ed)?\b",
            r"\brandomly\s+(?:assigned|allocated)\b",
            r"\brcts?\b",
        ],
    );

    /// Myocardial infarction and acute coronary syndromes
    pub static ref MI_FAMILY: ConceptFamily = ConceptFamily::new(
        "myocardial-infarction",
        &[
            "myocardial infarction",
            "acute myocardial infarction",
            "acute coronary syndrome",
            "stemi",
            "nstemi",
            "heart attack",
        ],
        &[
            r"\bn?stemi\b",
            r"\b(?:acute\s+)?myocardial\s+infarctions?\b",
            r"\bacute\s+coronary\s+syndromes?\b",
            r"\bst[\s-]+(?:segment[\s-]+)?elevation\b",
            r"\bheart\s+attacks?\b",
        ],
    );

    /// Secondary research: reviews and pooled analyses
    pub static ref REVIEW_FAMILY: ConceptFamily = ConceptFamily::new(
        "secondary-research",
        &[
            "systematic review",
            "meta-analysis",
            "meta analysis",
            "metaanalysis",
            "narrative review",
            "review article",
        ],
        &[
            r"\bsystematic(?:ally)?\s+review(?:s|ed)?\b",
            r"\bmeta[\s-]?analys[ie]s\b",
            r"\bnarrative\s+review\b",
            r"\bwe\s+searched\s+(?:medline|pubmed|embase|cochrane)\b",
            r"\bpooled\s+analysis\b",
        ],
    );

    static ref WHITESPACE: Regex = Regex::new(r"[\s_-]+").expect("whitespace pattern is valid");
}

/// Lowercase a keyword and collapse separators so it can be compared to
/// family triggers.
pub fn normalize_term(term: &str) -> String {
    let lowered = term.trim().to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '"' | '\''))
        .collect();
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Every known concept family.
pub fn all_families() -> [&'static ConceptFamily; 3] {
    [&*RCT_FAMILY, &*MI_FAMILY, &*REVIEW_FAMILY]
}

/// The concept family a keyword selects, if any.
pub fn family_for(term: &str) -> Option<&'static ConceptFamily> {
    let normalized = normalize_term(term);
    let hyphenated = normalized.replace(' ', "-");
    all_families()
        .into_iter()
        .find(|family| {
            family
                .triggers
                .iter()
                .any(|t| *t == normalized || *t == hyphenated)
        })
}
