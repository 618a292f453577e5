//! Embedding-similarity classifier.
//!
//! The article is split into segments (the title and each abstract
//! sentence). Each criterion is scored by its best cosine similarity to any
//! segment, and the per-criterion scores are aggregated:
//!
//! 1. An exclusion criterion scoring at least `exclusion_threshold` →
//!    EXCLUDE with confidence `0.5 + 0.5 × score` (capped at 0.95).
//! 2. More than half the inclusion criteria scoring at least
//!    `match_threshold` → INCLUDE with the satisfied fraction as confidence.
//! 3. No inclusion criterion satisfied → EXCLUDE with confidence
//!    `0.9 × (1 − best inclusion score)`.
//! 4. Otherwise MAYBE at 0.5.
//!
//! The result depends only on the encoder, so a deterministic encoder gives
//! reproducible decisions.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

use sieve_core::rules::patterns::all_families;
use sieve_core::{Article, Criteria, JudgmentResult, ScreeningDecision};

use super::embedding::{OllamaEncoder, DEFAULT_EMBEDDING_MODEL};
use super::factory::ProviderFactory;
use super::ollama::{resolve_base_url, DEFAULT_OLLAMA_TIMEOUT};
use super::{
    Attempt, FailureKind, JudgmentProvider, ProviderError, ProviderFailure, ProviderOutcome,
};

pub const CLASSIFIER_PROVIDER: &str = "classifier";
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.35;
pub const DEFAULT_EXCLUSION_THRESHOLD: f32 = 0.5;
pub const DEFAULT_DIMENSIONS: usize = 1024;

const CONFIDENCE_CEILING: f64 = 0.95;
const UNDECIDED_CONFIDENCE: f64 = 0.5;
const NO_TEXT_CONFIDENCE: f64 = 0.3;
const CONCEPT_WEIGHT: f32 = 3.0;

/// Turns texts into embedding vectors, one per input, in order.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    fn name(&self) -> &str;

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

lazy_static! {
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?]\s+").unwrap();
    static ref TOKEN: Regex = Regex::new(r"[a-z0-9]+").unwrap();
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "its", "of", "on", "or", "such", "than", "that", "the", "their", "these", "this", "to",
    "was", "were", "with", "we", "our", "without", "who", "which",
];

/// Deterministic hashed bag-of-words encoder.
///
/// Features are unigrams, bigrams and one token per biomedical concept
/// family mentioned in the text. Concept tokens weigh more so that
/// "randomly assigned" and "randomized controlled trial" land close
/// together.
#[derive(Debug, Clone)]
pub struct LexicalEncoder {
    dimensions: usize,
}

impl LexicalEncoder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(16),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        TOKEN
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !STOP_WORDS.contains(t))
            .map(stem)
            .collect()
    }

    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dimensions as u64) as usize
    }

    /// Encode one text into a unit-length vector (all zeros for no features).
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokens(text);

        for token in &tokens {
            vector[self.bucket(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            vector[self.bucket(&format!("{} {}", pair[0], pair[1]))] += 1.0;
        }
        for family in all_families() {
            if family.find(text).is_some() {
                vector[self.bucket(&format!("concept:{}", family.name))] += CONCEPT_WEIGHT;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for LexicalEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl TextEncoder for LexicalEncoder {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Strip a plural "s" ("trials" → "trial") but leave "analysis" alone.
fn stem(token: &str) -> String {
    if token.len() > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("is")
        && !token.ends_with("us")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Title plus abstract sentences, skipping blanks.
fn segments(article: &Article) -> Vec<String> {
    std::iter::once(article.title.trim())
        .chain(SENTENCE_BREAK.split(article.abstract_text.trim()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Criterion statements, falling back to keywords when none are written.
fn statements<'a>(primary: &'a [String], fallback: &'a [String]) -> &'a [String] {
    if primary.is_empty() {
        fallback
    } else {
        primary
    }
}

/// Judgment provider scoring criteria by embedding similarity.
pub struct ClassifierProvider {
    encoder: Arc<dyn TextEncoder>,
    match_threshold: f32,
    exclusion_threshold: f32,
}

impl ClassifierProvider {
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            encoder,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            exclusion_threshold: DEFAULT_EXCLUSION_THRESHOLD,
        }
    }

    /// Classifier with the built-in lexical encoder.
    pub fn lexical() -> Self {
        Self::new(Arc::new(LexicalEncoder::default()))
    }

    pub fn with_thresholds(mut self, match_threshold: f32, exclusion_threshold: f32) -> Self {
        self.match_threshold = match_threshold.clamp(0.0, 1.0);
        self.exclusion_threshold = exclusion_threshold.clamp(0.0, 1.0);
        self
    }

    fn aggregate(
        &self,
        inclusion: &[(&String, f32)],
        exclusion: &[(&String, f32)],
    ) -> JudgmentResult {
        let worst_exclusion = exclusion
            .iter()
            .filter(|(_, s)| *s >= self.exclusion_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((criterion, score)) = worst_exclusion {
            let confidence = (0.5 + 0.5 * f64::from(*score)).min(CONFIDENCE_CEILING);
            return JudgmentResult::new(
                ScreeningDecision::Exclude,
                confidence,
                format!(
                    "Matches exclusion criterion '{}' (similarity {:.2})",
                    criterion, score
                ),
            );
        }

        if inclusion.is_empty() {
            return JudgmentResult::new(
                ScreeningDecision::Maybe,
                UNDECIDED_CONFIDENCE,
                "No inclusion criteria to compare against",
            );
        }

        let satisfied = inclusion
            .iter()
            .filter(|(_, s)| *s >= self.match_threshold)
            .count();
        let fraction = satisfied as f64 / inclusion.len() as f64;
        let best = inclusion
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max);

        if satisfied * 2 > inclusion.len() {
            JudgmentResult::new(
                ScreeningDecision::Include,
                fraction.min(CONFIDENCE_CEILING),
                format!(
                    "Satisfies {} of {} inclusion criteria",
                    satisfied,
                    inclusion.len()
                ),
            )
        } else if satisfied == 0 {
            JudgmentResult::new(
                ScreeningDecision::Exclude,
                0.9 * (1.0 - f64::from(best.clamp(0.0, 1.0))),
                format!(
                    "Satisfies none of {} inclusion criteria (best similarity {:.2})",
                    inclusion.len(),
                    best
                ),
            )
        } else {
            JudgmentResult::new(
                ScreeningDecision::Maybe,
                UNDECIDED_CONFIDENCE,
                format!(
                    "Satisfies {} of {} inclusion criteria",
                    satisfied,
                    inclusion.len()
                ),
            )
        }
    }
}

#[async_trait]
impl JudgmentProvider for ClassifierProvider {
    fn name(&self) -> &str {
        CLASSIFIER_PROVIDER
    }

    async fn evaluate(
        &self,
        article: &Article,
        criteria: &Criteria,
        _attempt: Attempt,
    ) -> ProviderOutcome {
        let segments = segments(article);
        if segments.is_empty() {
            return ProviderOutcome::Success(JudgmentResult::new(
                ScreeningDecision::Maybe,
                NO_TEXT_CONFIDENCE,
                "Article has no text to classify",
            ));
        }

        let inclusion = statements(&criteria.inclusion_criteria, &criteria.include_keywords);
        let exclusion: Vec<&String> = statements(&criteria.exclusion_criteria, &criteria.exclude_keywords)
            .iter()
            .chain(criteria.study_types_exclude.iter())
            .collect();

        let texts: Vec<String> = segments
            .iter()
            .chain(inclusion.iter())
            .chain(exclusion.iter().copied())
            .cloned()
            .collect();

        let vectors = match self.encoder.encode(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => return e.into_outcome(),
        };
        if vectors.len() != texts.len() {
            return ProviderFailure::new(
                FailureKind::MalformedResponse,
                format!(
                    "encoder '{}' returned {} vectors for {} texts",
                    self.encoder.name(),
                    vectors.len(),
                    texts.len()
                ),
            )
            .into_outcome();
        }

        let (segment_vectors, criterion_vectors) = vectors.split_at(segments.len());
        let score = |v: &Vec<f32>| {
            segment_vectors
                .iter()
                .map(|s| cosine(s, v))
                .fold(0.0f32, f32::max)
        };

        let inclusion_scores: Vec<(&String, f32)> = inclusion
            .iter()
            .zip(&criterion_vectors[..inclusion.len()])
            .map(|(c, v)| (c, score(v)))
            .collect();
        let exclusion_scores: Vec<(&String, f32)> = exclusion
            .iter()
            .copied()
            .zip(&criterion_vectors[inclusion.len()..])
            .map(|(c, v)| (c, score(v)))
            .collect();

        debug!(
            encoder = %self.encoder.name(),
            segments = segments.len(),
            inclusion = ?inclusion_scores.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
            exclusion = ?exclusion_scores.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
            "Classifier scores"
        );

        ProviderOutcome::Success(self.aggregate(&inclusion_scores, &exclusion_scores))
    }

    async fn health_check(&self) -> bool {
        self.encoder.encode(&["health".to_string()]).await.is_ok()
    }
}

fn threshold_from(config: &JsonValue, key: &str, default: f32) -> Result<f32, ProviderError> {
    match config[key].as_f64() {
        None if config[key].is_null() => Ok(default),
        Some(v) if (0.0..=1.0).contains(&v) => Ok(v as f32),
        _ => Err(ProviderError::NotConfigured(format!(
            "{} must be a number in [0, 1]",
            key
        ))),
    }
}

/// Factory for the classifier provider.
///
/// ## Configuration Format
/// ```json
/// {
///   "encoder": "lexical",              // or "ollama"
///   "match_threshold": 0.35,           // Optional
///   "exclusion_threshold": 0.5,        // Optional
///   "base_url": "http://...",          // ollama encoder only
///   "model": "nomic-embed-text"        // ollama encoder only
/// }
/// ```
pub struct ClassifierProviderFactory;

impl ProviderFactory for ClassifierProviderFactory {
    fn provider_type(&self) -> &'static str {
        CLASSIFIER_PROVIDER
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn JudgmentProvider>, ProviderError> {
        self.validate_config(config)?;

        let encoder: Arc<dyn TextEncoder> = match config["encoder"].as_str().unwrap_or("lexical") {
            "ollama" => Arc::new(OllamaEncoder::new(
                resolve_base_url(config),
                config["model"].as_str().unwrap_or(DEFAULT_EMBEDDING_MODEL),
                DEFAULT_OLLAMA_TIMEOUT,
            )?),
            _ => Arc::new(LexicalEncoder::default()),
        };

        let provider = ClassifierProvider::new(encoder).with_thresholds(
            threshold_from(config, "match_threshold", DEFAULT_MATCH_THRESHOLD)?,
            threshold_from(config, "exclusion_threshold", DEFAULT_EXCLUSION_THRESHOLD)?,
        );
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        match config["encoder"].as_str() {
            None | Some("lexical") | Some("ollama") => {}
            Some(other) => {
                return Err(ProviderError::NotConfigured(format!(
                    "unknown encoder '{}', expected 'lexical' or 'ollama'",
                    other
                )))
            }
        }
        threshold_from(config, "match_threshold", DEFAULT_MATCH_THRESHOLD)?;
        threshold_from(config, "exclusion_threshold", DEFAULT_EXCLUSION_THRESHOLD)?;
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "encoder": "lexical",
            "match_threshold": DEFAULT_MATCH_THRESHOLD,
            "exclusion_threshold": DEFAULT_EXCLUSION_THRESHOLD
        })
    }

    fn description(&self) -> &'static str {
        "Embedding similarity between article sentences and each criterion"
    }
}
