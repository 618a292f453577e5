//! Screening prompts for generative providers.
//!
//! Two variants exist. The standard prompt asks for three labelled lines.
//! The strict prompt is used after a response could not be parsed; it
//! repeats the format rules and asks for a bare JSON object.

use sieve_core::{Article, Criteria};

use crate::providers::ChatMessage;

/// System prompt shared by both variants.
pub const SYSTEM_PROMPT: &str = "You are a systematic review expert screening research \
articles for a review. You judge only against the criteria you are given. You report \
original primary research as INCLUDE only when the abstract supports it, and you answer \
MAYBE when the abstract does not contain enough information to decide.";

const STANDARD_FORMAT: &str = r#"Answer in exactly this format:
DECISION: one of INCLUDE, EXCLUDE, MAYBE
CONFIDENCE: a number between 0.0 and 1.0
REASONING: one or two sentences citing the criteria"#;

const STRICT_FORMAT: &str = r#"Your previous answer could not be read. Reply with ONLY a JSON object and nothing else:
{"decision": "INCLUDE" | "EXCLUDE" | "MAYBE", "confidence": <number from 0.0 to 1.0>, "reasoning": "<one sentence>"}
Do not use percentages. Do not add text before or after the object."#;

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn optional_line(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        format!("{}: {}\n", label, value.trim())
    }
}

/// The user message describing the article and the criteria.
pub fn screening_prompt(article: &Article, criteria: &Criteria, strict: bool) -> String {
    let mut prompt = String::new();

    prompt.push_str("ARTICLE TO SCREEN\n");
    prompt.push_str(&format!("Title: {}\n", article.title.trim()));
    prompt.push_str(&format!(
        "Abstract: {}\n",
        if article.abstract_text.trim().is_empty() {
            "(no abstract available)"
        } else {
            article.abstract_text.trim()
        }
    ));
    prompt.push_str(&optional_line("Journal", &article.journal));
    prompt.push_str(&optional_line("Year", &article.year));

    prompt.push_str("\nINCLUSION CRITERIA\n");
    prompt.push_str(&bullet_list(&criteria.inclusion_criteria));
    prompt.push_str("\n\nEXCLUSION CRITERIA\n");
    prompt.push_str(&bullet_list(&criteria.exclusion_criteria));

    if !criteria.study_types_exclude.is_empty() {
        prompt.push_str("\n\nEXCLUDED STUDY TYPES\n");
        prompt.push_str(&bullet_list(&criteria.study_types_exclude));
    }

    prompt.push_str(
        "\n\nExclude reviews, meta-analyses and commentary that report no new trial data.\n\n",
    );
    prompt.push_str(if strict { STRICT_FORMAT } else { STANDARD_FORMAT });

    prompt
}

/// System and user messages for one screening request.
pub fn screening_messages(article: &Article, criteria: &Criteria, strict: bool) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(screening_prompt(article, criteria, strict)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::SAMPLE_CRITERIA_YAML;

    fn article() -> Article {
        Article::new("Aspirin in STEMI", "A randomized trial.")
    }

    #[test]
    fn test_standard_prompt_contents() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let prompt = screening_prompt(&article(), &criteria, false);

        assert!(prompt.contains("Title: Aspirin in STEMI"));
        assert!(prompt.contains("- Adult patients with STEMI or NSTEMI"));
        assert!(prompt.contains("EXCLUDED STUDY TYPES"));
        assert!(prompt.contains("DECISION:"));
        assert!(!prompt.contains("JSON object"));
    }

    #[test]
    fn test_strict_prompt_asks_for_json() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let prompt = screening_prompt(&article(), &criteria, true);
        assert!(prompt.contains("ONLY a JSON object"));
    }

    #[test]
    fn test_missing_abstract_marked() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let prompt = screening_prompt(&Article::new("T", ""), &criteria, false);
        assert!(prompt.contains("(no abstract available)"));
        assert!(!prompt.contains("Journal:"));
    }

    #[test]
    fn test_messages_roles() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        let messages = screening_messages(&article(), &criteria, false);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
