//! Engine configuration.
//!
//! Loaded from YAML or JSON, then adjusted from the environment:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `SIEVE_CONFIDENCE_THRESHOLD` (or `CONFIDENCE_THRESHOLD`) | `confidence_threshold` |
//! | `SIEVE_PROVIDERS` (comma separated) | `provider_priority` |
//! | `SIEVE_MAX_ARTICLES` (or `MAX_ARTICLES`) | `max_articles` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use sieve_core::DEFAULT_CONFIDENCE_THRESHOLD;

use crate::resilience::BackoffPolicy;

pub const CONFIDENCE_THRESHOLD_ENV: &str = "SIEVE_CONFIDENCE_THRESHOLD";
pub const LEGACY_CONFIDENCE_THRESHOLD_ENV: &str = "CONFIDENCE_THRESHOLD";
pub const PROVIDERS_ENV: &str = "SIEVE_PROVIDERS";
pub const MAX_ARTICLES_ENV: &str = "SIEVE_MAX_ARTICLES";
pub const LEGACY_MAX_ARTICLES_ENV: &str = "MAX_ARTICLES";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("Unknown provider '{id}'. Available: {available}")]
    UnknownProvider { id: String, available: String },
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.into(),
    }
}

/// Configuration for one screening run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreeningConfig {
    /// Definite decisions below this confidence become MAYBE
    pub confidence_threshold: f64,

    /// Provider ids, best first
    pub provider_priority: Vec<String>,

    /// Attempts per provider, including the first
    pub max_attempts: u32,

    #[serde(with = "duration_str")]
    pub base_delay: Duration,

    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    pub jitter_fraction: f64,

    /// Stop a session after this many articles; 0 means no limit
    #[serde(with = "limit_count")]
    pub max_articles: Option<usize>,

    /// Per-provider settings, keyed by provider id
    pub providers: BTreeMap<String, serde_json::Value>,
}

/// Session article limit for a raw count, where 0 means unlimited.
pub fn article_limit(count: usize) -> Option<usize> {
    (count > 0).then_some(count)
}

mod limit_count {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(limit: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        limit.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<usize>::deserialize(deserializer)?.and_then(super::article_limit))
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            provider_priority: vec!["groq".to_string(), "classifier".to_string()],
            max_attempts: backoff.max_attempts,
            base_delay: backoff.base_delay,
            max_delay: backoff.max_delay,
            jitter_fraction: backoff.jitter_fraction,
            max_articles: Some(1000),
            providers: BTreeMap::new(),
        }
    }
}

impl ScreeningConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.json` file, or YAML otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(raw) = first(&[CONFIDENCE_THRESHOLD_ENV, LEGACY_CONFIDENCE_THRESHOLD_ENV]) {
            self.confidence_threshold = raw.trim().parse().map_err(|_| {
                invalid("confidence_threshold", format!("'{}' is not a number", raw))
            })?;
        }

        if let Some(raw) = first(&[PROVIDERS_ENV]) {
            self.provider_priority = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(raw) = first(&[MAX_ARTICLES_ENV, LEGACY_MAX_ARTICLES_ENV]) {
            let limit: usize = raw.trim().parse().map_err(|_| {
                invalid("max_articles", format!("'{}' is not a count", raw))
            })?;
            self.max_articles = article_limit(limit);
        }

        Ok(())
    }

    /// Check ranges and resolve provider ids against `known` ids.
    pub fn validate(&self, known: &[&str]) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        if self.max_attempts < 1 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(invalid(
                "jitter_fraction",
                format!("{} is outside [0, 1)", self.jitter_fraction),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(invalid("base_delay", "must not exceed max_delay"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for id in &self.provider_priority {
            if id.trim().is_empty() {
                return Err(invalid("provider_priority", "provider ids must not be empty"));
            }
            if !seen.insert(id.as_str()) {
                return Err(invalid(
                    "provider_priority",
                    format!("'{}' is listed twice", id),
                ));
            }
            if !known.contains(&id.as_str()) {
                return Err(ConfigError::UnknownProvider {
                    id: id.clone(),
                    available: known.join(", "),
                });
            }
        }

        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter_fraction: self.jitter_fraction,
        }
    }

    /// Settings for one provider, or an empty object.
    pub fn provider_config(&self, id: &str) -> serde_json::Value {
        self.providers
            .get(id)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["classifier", "groq", "ollama", "rule-based"];

    #[test]
    fn test_defaults_are_valid() {
        let config = ScreeningConfig::default();
        assert!(config.validate(KNOWN).is_ok());
        assert_eq!(config.confidence_threshold, 0.7);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
confidence_threshold: 0.8
provider_priority: [ollama, classifier]
max_attempts: 4
base_delay: 500ms
max_delay: 10s
providers:
  ollama:
    model: "llama3.1:8b"
"#;
        let config = ScreeningConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.jitter_fraction, 0.25);
        assert_eq!(config.provider_config("ollama")["model"], "llama3.1:8b");
        assert_eq!(config.provider_config("groq"), serde_json::json!({}));
    }

    #[test]
    fn test_zero_max_articles_means_unlimited() {
        let config = ScreeningConfig::from_yaml("max_articles: 0").unwrap();
        assert_eq!(config.max_articles, None);

        let config = ScreeningConfig::from_json(r#"{"max_articles": 0}"#).unwrap();
        assert_eq!(config.max_articles, None);

        let config = ScreeningConfig::from_yaml("max_articles: 12").unwrap();
        assert_eq!(config.max_articles, Some(12));

        let config = ScreeningConfig::from_yaml("confidence_threshold: 0.8").unwrap();
        assert_eq!(config.max_articles, Some(1000));
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        assert!(ScreeningConfig::from_yaml("threshold: 0.5").is_err());
        assert!(ScreeningConfig::from_yaml("base_delay: soon").is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = ScreeningConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate(KNOWN).is_err());

        config.confidence_threshold = 0.5;
        config.max_attempts = 0;
        assert!(config.validate(KNOWN).is_err());

        config.max_attempts = 1;
        config.jitter_fraction = 1.0;
        assert!(config.validate(KNOWN).is_err());

        config.jitter_fraction = 0.0;
        config.base_delay = Duration::from_secs(60);
        assert!(config.validate(KNOWN).is_err());
    }

    #[test]
    fn test_validate_provider_ids() {
        let mut config = ScreeningConfig {
            provider_priority: vec!["groq".into(), "groq".into()],
            ..Default::default()
        };
        assert!(config.validate(KNOWN).is_err());

        config.provider_priority = vec!["gpt-9".into()];
        assert!(matches!(
            config.validate(KNOWN),
            Err(ConfigError::UnknownProvider { .. })
        ));

        config.provider_priority = vec![];
        assert!(config.validate(KNOWN).is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: BTreeMap<&str, &str> = [
            ("CONFIDENCE_THRESHOLD", "0.9"),
            ("SIEVE_PROVIDERS", "ollama, classifier,"),
            ("SIEVE_MAX_ARTICLES", "25"),
        ]
        .into_iter()
        .collect();

        let mut config = ScreeningConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.confidence_threshold, 0.9);
        assert_eq!(config.provider_priority, vec!["ollama", "classifier"]);
        assert_eq!(config.max_articles, Some(25));
    }

    #[test]
    fn test_zero_max_articles_override_clears_limit() {
        let mut config = ScreeningConfig::default();
        config
            .apply_overrides(|k| (k == MAX_ARTICLES_ENV).then(|| "0".to_string()))
            .unwrap();
        assert_eq!(config.max_articles, None);
    }

    #[test]
    fn test_override_prefers_namespaced_variable() {
        let mut config = ScreeningConfig::default();
        config
            .apply_overrides(|k| match k {
                CONFIDENCE_THRESHOLD_ENV => Some("0.6".to_string()),
                LEGACY_CONFIDENCE_THRESHOLD_ENV => Some("0.9".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.confidence_threshold, 0.6);
    }

    #[test]
    fn test_bad_override_is_error() {
        let mut config = ScreeningConfig::default();
        let result = config.apply_overrides(|k| (k == MAX_ARTICLES_ENV).then(|| "many".to_string()));
        assert!(result.is_err());
    }
}
