//! Screening criteria: loading, schema validation and semantic checks.
//!
//! Criteria documents are YAML or JSON. They are validated against an
//! embedded JSON Schema before deserialization, then checked for the rules
//! the schema cannot express.

mod parser;
mod schema;

pub use parser::{Criteria, CriteriaError};
pub use schema::validate_criteria_schema;

/// Example criteria document for a cardiology review.
pub const SAMPLE_CRITERIA_YAML: &str = r#"# Screening criteria for a systematic review.
# All four lists are required; they may be empty, but not all of
# inclusion_criteria and exclusion_criteria at once.
name: "Antiplatelet therapy after acute myocardial infarction"
description: "Primary randomized trials of antiplatelet drugs in STEMI/NSTEMI"

inclusion_criteria:
  - "Randomized controlled trial (RCT) reporting original results"
  - "Adult patients with STEMI or NSTEMI"
  - "Pharmacological antiplatelet intervention"
  - "Clinical outcomes such as mortality, reinfarction or bleeding"

exclusion_criteria:
  - "Systematic reviews, meta-analyses or narrative reviews"
  - "Animal or in vitro studies"
  - "Procedural interventions without a drug component"
  - "Case reports and case series"

include_keywords:
  - "randomized controlled trial"
  - "STEMI/NSTEMI"
  - "myocardial infarction"
  - "aspirin"
  - "clopidogrel"
  - "ticagrelor"
  - "prasugrel"

exclude_keywords:
  - "systematic review"
  - "meta-analysis"
  - "in vitro"
  - "mice"
  - "case report"

# Counted twice when scoring exclusions
study_types_exclude:
  - "narrative review"
  - "case series"
  - "animal study"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_criteria_loads() {
        let criteria = Criteria::from_yaml(SAMPLE_CRITERIA_YAML).unwrap();
        assert_eq!(criteria.inclusion_criteria.len(), 4);
        assert_eq!(criteria.study_types_exclude.len(), 3);
        assert!(criteria.name.is_some());
    }
}
