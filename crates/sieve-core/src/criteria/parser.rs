//! Criteria parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_criteria_schema;

/// Fields every criteria document must carry, even when empty.
const REQUIRED_FIELDS: [&str; 4] = [
    "inclusion_criteria",
    "exclusion_criteria",
    "include_keywords",
    "exclude_keywords",
];

/// Errors that can occur when loading criteria.
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("Failed to read criteria file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Criteria failed schema validation: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Invalid criteria: {0}")]
    ValidationError(String),
}

/// Inclusion/exclusion rules for one screening session.
///
/// Immutable once loaded; providers only ever see `&Criteria`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criteria {
    /// Human-readable name of the review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Inclusion statements, in priority order
    pub inclusion_criteria: Vec<String>,

    /// Exclusion statements, in priority order
    pub exclusion_criteria: Vec<String>,

    pub include_keywords: Vec<String>,

    pub exclude_keywords: Vec<String>,

    /// Study designs that rule an article out
    #[serde(default)]
    pub study_types_exclude: Vec<String>,
}

impl Criteria {
    /// Parse criteria from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CriteriaError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse criteria from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CriteriaError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse criteria from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse criteria from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse criteria from a file, choosing the format by extension.
    ///
    /// `.json` is read as JSON; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_yaml_file(path)
        }
    }

    /// Build criteria from an already-parsed document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CriteriaError> {
        let object = value.as_object().ok_or_else(|| {
            CriteriaError::ValidationError("criteria document must be a mapping".to_string())
        })?;

        for field in REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(CriteriaError::MissingField(field.to_string()));
            }
        }

        validate_criteria_schema(&value).map_err(CriteriaError::SchemaError)?;

        let criteria: Criteria = serde_json::from_value(value)?;
        criteria.validate()?;
        Ok(criteria)
    }

    /// Check the semantic rules the schema cannot express.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.inclusion_criteria.is_empty() && self.exclusion_criteria.is_empty() {
            return Err(CriteriaError::ValidationError(
                "inclusion_criteria and exclusion_criteria are both empty".to_string(),
            ));
        }

        let keyword_lists = [
            ("include_keywords", &self.include_keywords),
            ("exclude_keywords", &self.exclude_keywords),
            ("study_types_exclude", &self.study_types_exclude),
        ];

        for (field, list) in keyword_lists {
            if let Some(index) = list.iter().position(|k| k.trim().is_empty()) {
                return Err(CriteriaError::ValidationError(format!(
                    "{}[{}] is empty",
                    field, index
                )));
            }
        }

        Ok(())
    }

    /// Terms whose presence argues for inclusion.
    ///
    /// Falls back to the inclusion statements when no keywords are given.
    pub fn inclusion_terms(&self) -> &[String] {
        if self.include_keywords.is_empty() {
            &self.inclusion_criteria
        } else {
            &self.include_keywords
        }
    }

    /// Terms whose presence argues for exclusion, excluding study types.
    pub fn exclusion_terms(&self) -> &[String] {
        if self.exclude_keywords.is_empty() {
            &self.exclusion_criteria
        } else {
            &self.exclude_keywords
        }
    }

    /// Display name, or a generic label.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed criteria")
    }
}
