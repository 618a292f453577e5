//! Parsing of free-form generative model output.
//!
//! Two forms are accepted: a JSON object with `decision`, `confidence` and
//! `reasoning` keys, or labelled lines:
//!
//! ```text
//! DECISION: INCLUDE
//! CONFIDENCE: 0.85
//! REASONING: Randomized trial of aspirin in STEMI patients.
//! ```
//!
//! Anything ambiguous is a [`ParseFailure`]. The parser never guesses a
//! decision or a confidence.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::types::{JudgmentResult, ScreeningDecision};

/// Reasoning used when the model gives a decision and confidence only.
pub const DEFAULT_REASONING: &str = "No reasoning provided";

/// Why a model response could not be turned into a judgment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("Response was empty")]
    Empty,

    #[error("No DECISION found in response")]
    MissingDecision,

    #[error("Unrecognized decision '{0}'")]
    InvalidDecision(String),

    #[error("Response contains conflicting decisions: {0} and {1}")]
    ConflictingDecision(ScreeningDecision, ScreeningDecision),

    #[error("No CONFIDENCE found in response")]
    MissingConfidence,

    #[error("Response contains conflicting confidences: {0} and {1}")]
    ConflictingConfidence(f64, f64),

    #[error("Confidence '{0}' is not a value in [0, 1] or a percentage")]
    InvalidConfidence(String),
}

lazy_static! {
    static ref DECISION_LINE: Regex = Regex::new(
        r"(?im)^[\s*#>-]*decision[\s*]*[:=][\s*\[]*([A-Za-z/|]+)"
    ).unwrap();

    static ref CONFIDENCE_LINE: Regex = Regex::new(
        r"(?im)^[\s*#>-]*confidence[\s*]*[:=][\s*\[]*([0-9]*\.?[0-9]+)\s*(%)?"
    ).unwrap();

    static ref CONFIDENCE_LABEL: Regex = Regex::new(
        r"(?im)^[\s*#>-]*confidence[\s*]*[:=]"
    ).unwrap();

    static ref REASONING_LINE: Regex = Regex::new(
        r"(?ims)^[\s*#>-]*reasoning[\s*]*[:=][\s*]*(.+)"
    ).unwrap();
}

/// Parse a model response into a judgment.
pub fn parse_judgment(response: &str) -> Result<JudgmentResult, ParseFailure> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    if let Some(object) = extract_json_object(trimmed) {
        return parse_json_judgment(&object);
    }

    parse_labelled_judgment(trimmed)
}

/// The first top-level JSON object embedded in `text`, if it has a
/// `decision` key.
fn extract_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(serde_json::Value::Object(map))
            if map.keys().any(|k| k.eq_ignore_ascii_case("decision")) =>
        {
            Some(map)
        }
        _ => None,
    }
}

fn field<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Option<&'a serde_json::Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn parse_json_judgment(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<JudgmentResult, ParseFailure> {
    let decision = match field(object, "decision") {
        Some(serde_json::Value::String(s)) => parse_decision(s)?,
        Some(other) => return Err(ParseFailure::InvalidDecision(other.to_string())),
        None => return Err(ParseFailure::MissingDecision),
    };

    let confidence = match field(object, "confidence") {
        Some(serde_json::Value::Number(n)) => {
            let raw = n.to_string();
            let value = n.as_f64().ok_or_else(|| ParseFailure::InvalidConfidence(raw.clone()))?;
            check_confidence(value, false, &raw)?
        }
        Some(serde_json::Value::String(s)) => parse_confidence_text(s)?,
        Some(serde_json::Value::Null) | None => return Err(ParseFailure::MissingConfidence),
        Some(other) => return Err(ParseFailure::InvalidConfidence(other.to_string())),
    };

    let reasoning = match field(object, "reasoning") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => DEFAULT_REASONING.to_string(),
    };

    Ok(JudgmentResult::new(decision, confidence, reasoning))
}

fn parse_labelled_judgment(text: &str) -> Result<JudgmentResult, ParseFailure> {
    let mut decision: Option<ScreeningDecision> = None;
    for caps in DECISION_LINE.captures_iter(text) {
        let found = parse_decision(&caps[1])?;
        match decision {
            Some(existing) if existing != found => {
                return Err(ParseFailure::ConflictingDecision(existing, found));
            }
            _ => decision = Some(found),
        }
    }
    let decision = decision.ok_or(ParseFailure::MissingDecision)?;

    let mut confidence: Option<f64> = None;
    for caps in CONFIDENCE_LINE.captures_iter(text) {
        let raw = &caps[1];
        let value: f64 = raw
            .parse()
            .map_err(|_| ParseFailure::InvalidConfidence(raw.to_string()))?;
        let found = check_confidence(value, caps.get(2).is_some(), raw)?;
        match confidence {
            Some(existing) if (existing - found).abs() > f64::EPSILON => {
                return Err(ParseFailure::ConflictingConfidence(existing, found));
            }
            _ => confidence = Some(found),
        }
    }
    let confidence = match confidence {
        Some(value) => value,
        None if CONFIDENCE_LABEL.is_match(text) => {
            return Err(ParseFailure::InvalidConfidence(label_value(text)));
        }
        None => return Err(ParseFailure::MissingConfidence),
    };

    let reasoning = REASONING_LINE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());

    Ok(JudgmentResult::new(decision, confidence, reasoning))
}

fn parse_decision(raw: &str) -> Result<ScreeningDecision, ParseFailure> {
    ScreeningDecision::from_keyword(raw).ok_or_else(|| ParseFailure::InvalidDecision(raw.trim().to_string()))
}

fn parse_confidence_text(raw: &str) -> Result<f64, ParseFailure> {
    let trimmed = raw.trim();
    let (number, percent) = match trimmed.strip_suffix('%') {
        Some(n) => (n.trim(), true),
        None => (trimmed, false),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| ParseFailure::InvalidConfidence(trimmed.to_string()))?;
    check_confidence(value, percent, trimmed)
}

/// Percentages are scaled; a bare number must already be a fraction.
fn check_confidence(value: f64, percent: bool, raw: &str) -> Result<f64, ParseFailure> {
    let value = if percent { value / 100.0 } else { value };
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParseFailure::InvalidConfidence(raw.to_string()))
    }
}

fn label_value(text: &str) -> String {
    text.lines()
        .find(|l| CONFIDENCE_LABEL.is_match(l))
        .and_then(|l| l.split_once([':', '=']).map(|(_, v)| v.trim().to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_lines() {
        let response = "DECISION: INCLUDE\nCONFIDENCE: 0.85\nREASONING: RCT of aspirin in STEMI.";
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.decision(), ScreeningDecision::Include);
        assert_eq!(judgment.confidence(), 0.85);
        assert_eq!(judgment.reasoning(), "RCT of aspirin in STEMI.");
    }

    #[test]
    fn test_markdown_decorations_and_case() {
        let response = "**Decision:** exclude\n**Confidence:** 90%\n**Reasoning:** Narrative review.";
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.decision(), ScreeningDecision::Exclude);
        assert!((judgment.confidence() - 0.9).abs() < 1e-9);
        assert_eq!(judgment.reasoning(), "Narrative review.");
    }

    #[test]
    fn test_json_object_in_prose() {
        let response = r#"Here is my answer:
{"decision": "MAYBE", "confidence": 0.4, "reasoning": "Abstract unclear"}"#;
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.decision(), ScreeningDecision::Maybe);
        assert_eq!(judgment.confidence(), 0.4);
    }

    #[test]
    fn test_json_string_percentage() {
        let judgment =
            parse_judgment(r#"{"decision": "include", "confidence": "85%"}"#).unwrap();
        assert!((judgment.confidence() - 0.85).abs() < 1e-9);
        assert_eq!(judgment.reasoning(), DEFAULT_REASONING);
    }

    #[test]
    fn test_missing_decision() {
        assert_eq!(
            parse_judgment("I think this article should be included."),
            Err(ParseFailure::MissingDecision)
        );
    }

    #[test]
    fn test_missing_confidence() {
        assert_eq!(
            parse_judgment("DECISION: EXCLUDE\nREASONING: review"),
            Err(ParseFailure::MissingConfidence)
        );
    }

    #[test]
    fn test_bare_number_above_one_rejected() {
        assert!(matches!(
            parse_judgment("DECISION: INCLUDE\nCONFIDENCE: 85"),
            Err(ParseFailure::InvalidConfidence(_))
        ));
    }

    #[test]
    fn test_non_numeric_confidence_rejected() {
        assert_eq!(
            parse_judgment("DECISION: INCLUDE\nCONFIDENCE: high"),
            Err(ParseFailure::InvalidConfidence("high".to_string()))
        );
    }

    #[test]
    fn test_conflicting_decisions() {
        assert_eq!(
            parse_judgment("DECISION: INCLUDE\nDECISION: EXCLUDE\nCONFIDENCE: 0.9"),
            Err(ParseFailure::ConflictingDecision(
                ScreeningDecision::Include,
                ScreeningDecision::Exclude
            ))
        );
    }

    #[test]
    fn test_conflicting_confidences() {
        assert_eq!(
            parse_judgment("DECISION: INCLUDE\nCONFIDENCE: 0.9\nCONFIDENCE: 40%"),
            Err(ParseFailure::ConflictingConfidence(0.9, 0.4))
        );
    }

    #[test]
    fn test_repeated_confidence_accepted() {
        let judgment =
            parse_judgment("DECISION: INCLUDE\nCONFIDENCE: 0.8\nSummary\nCONFIDENCE: 80%").unwrap();
        assert!((judgment.confidence() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_bold_reasoning_label_stripped() {
        let response = "DECISION: INCLUDE\nCONFIDENCE: 0.9\n**REASONING:**   RCT in STEMI.";
        assert_eq!(parse_judgment(response).unwrap().reasoning(), "RCT in STEMI.");
    }

    #[test]
    fn test_echoed_template_rejected() {
        assert!(matches!(
            parse_judgment("DECISION: [INCLUDE/EXCLUDE/MAYBE]\nCONFIDENCE: [0.0-1.0]"),
            Err(ParseFailure::InvalidDecision(_))
        ));
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(parse_judgment("   \n"), Err(ParseFailure::Empty));
    }

    #[test]
    fn test_multiline_reasoning_kept() {
        let response = "DECISION: EXCLUDE\nCONFIDENCE: 0.95\nREASONING: Pooled data.\nNo new patients.";
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.reasoning(), "Pooled data.\nNo new patients.");
    }
}
