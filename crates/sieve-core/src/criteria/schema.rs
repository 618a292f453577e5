//! JSON Schema validation for criteria documents.
//!
//! The schema is embedded at compile time and compiled once on first use.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded criteria schema.
const CRITERIA_SCHEMA_JSON: &str = include_str!("../../schema/criteria.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(CRITERIA_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a criteria document against the schema.
///
/// Returns every violation as `"<message> at <pointer>"`.
pub fn validate_criteria_schema(value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_passes() {
        let value = serde_json::json!({
            "inclusion_criteria": ["Randomized controlled trial"],
            "exclusion_criteria": [],
            "include_keywords": ["randomized"],
            "exclude_keywords": []
        });
        assert!(validate_criteria_schema(&value).is_ok());
    }

    #[test]
    fn test_wrong_item_type_fails() {
        let value = serde_json::json!({
            "inclusion_criteria": ["RCT"],
            "exclusion_criteria": [],
            "include_keywords": [42],
            "exclude_keywords": []
        });
        let errors = validate_criteria_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/include_keywords/0")));
    }

    #[test]
    fn test_unknown_field_fails() {
        let value = serde_json::json!({
            "inclusion_criteria": ["RCT"],
            "exclusion_criteria": [],
            "include_keywords": [],
            "exclude_keywords": [],
            "include_keyword": ["typo"]
        });
        assert!(validate_criteria_schema(&value).is_err());
    }

    #[test]
    fn test_optional_sections_pass() {
        let value = serde_json::json!({
            "name": "Antiplatelet therapy after MI",
            "description": "Primary trials only",
            "inclusion_criteria": ["RCT"],
            "exclusion_criteria": ["Reviews"],
            "include_keywords": ["aspirin"],
            "exclude_keywords": ["review"],
            "study_types_exclude": ["meta-analysis"]
        });
        assert!(validate_criteria_schema(&value).is_ok());
    }
}
