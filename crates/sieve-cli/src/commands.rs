//! Command implementations.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use sieve_core::{Article, Criteria};
use sieve_runtime::{
    article_limit, FallbackEvent, FallbackOrchestrator, ProviderRegistry, ScreeningConfig,
    ScreeningSession, SessionSummary,
};

use crate::refman;

pub struct ScreenOptions {
    pub input: PathBuf,
    pub criteria: PathBuf,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub providers: Option<String>,
    pub threshold: Option<f64>,
    pub max_articles: Option<usize>,
}

/// One line of the JSON report.
#[derive(Debug, Serialize)]
struct ArticleReport {
    index: usize,
    label: String,
    title: String,
    decision: sieve_core::ScreeningDecision,
    confidence: f64,
    reasoning: String,
    provider: String,
    provider_decision: sieve_core::ScreeningDecision,
    downgraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fallback_events: Vec<FallbackEvent>,
}

#[derive(Debug, Serialize)]
struct Report {
    criteria: String,
    generated_at: chrono::DateTime<chrono::Utc>,
    providers: Vec<String>,
    confidence_threshold: f64,
    summary: SessionSummary,
    results: Vec<ArticleReport>,
}

/// Read articles from RIS/RefMan, JSON or YAML, chosen by extension.
pub fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let articles = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid article list in {}", path.display()))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid article list in {}", path.display()))?,
        Some("ris") | Some("txt") => refman::parse(&content),
        other => bail!(
            "Unsupported input format {:?}; use .ris, .txt, .json or .yaml",
            other.unwrap_or("")
        ),
    };
    Ok(articles)
}

/// Load the engine config (or defaults), then environment, then flags.
fn load_config(path: Option<&Path>) -> Result<ScreeningConfig> {
    let mut config = match path {
        Some(path) => ScreeningConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScreeningConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

pub async fn screen(options: ScreenOptions) -> Result<()> {
    let criteria = Criteria::from_file(&options.criteria)
        .with_context(|| format!("Invalid criteria file {}", options.criteria.display()))?;

    let mut config = load_config(options.config.as_deref())?;
    if let Some(providers) = &options.providers {
        config.provider_priority = providers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(threshold) = options.threshold {
        config.confidence_threshold = threshold;
    }
    if let Some(max) = options.max_articles {
        config.max_articles = article_limit(max);
    }

    let orchestrator = FallbackOrchestrator::from_config(&config, &ProviderRegistry::with_defaults())?;
    let mut articles = load_articles(&options.input)?;
    if articles.is_empty() {
        bail!("No articles found in {}", options.input.display());
    }

    tracing::info!(
        articles = articles.len(),
        criteria = criteria.display_name(),
        providers = ?orchestrator.provider_names(),
        "Starting screening session"
    );

    let session = ScreeningSession::new(&orchestrator, &criteria).with_max_articles(config.max_articles);

    let cancel = session.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing the current article...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let total = articles.len();
    let mut results = Vec::new();
    let summary = session
        .run(&mut articles, |index, article, outcome| {
            eprintln!(
                "[{}/{}] {} {:.2} ({}) {}",
                index + 1,
                total,
                outcome.decision,
                outcome.confidence,
                outcome.provider,
                article.label()
            );
            results.push(ArticleReport {
                index,
                label: article.label(),
                title: article.title.clone(),
                decision: outcome.decision,
                confidence: outcome.confidence,
                reasoning: outcome.reasoning.clone(),
                provider: outcome.provider.clone(),
                provider_decision: outcome.provider_decision,
                downgraded: outcome.downgraded,
                fallback_events: outcome.fallback_events.clone(),
            });
        })
        .await;

    print_summary(&summary);

    let report = Report {
        criteria: criteria.display_name().to_string(),
        generated_at: chrono::Utc::now(),
        providers: orchestrator
            .provider_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        confidence_threshold: orchestrator.threshold(),
        summary,
        results,
    };
    let json = serde_json::to_string_pretty(&report)?;

    match &options.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    eprintln!();
    eprintln!("Screened {} article(s)", summary.total);
    eprintln!("  INCLUDE: {}", summary.included);
    eprintln!("  EXCLUDE: {}", summary.excluded);
    eprintln!("  MAYBE:   {}", summary.maybe);
    eprintln!("  Mean confidence: {:.2}", summary.mean_confidence);
    eprintln!("  High confidence (>= 0.8): {}", summary.high_confidence);
    if summary.downgraded > 0 {
        eprintln!("  Downgraded to MAYBE: {}", summary.downgraded);
    }
    if summary.fallback_events > 0 {
        eprintln!("  Fallback events: {}", summary.fallback_events);
    }
    if summary.skipped > 0 {
        eprintln!("  Already decided, skipped: {}", summary.skipped);
    }
    if let Some(reason) = summary.stopped {
        eprintln!("  Stopped early: {:?}", reason);
    }
}

pub fn validate_criteria(path: &Path) -> Result<()> {
    let criteria = Criteria::from_file(path)
        .with_context(|| format!("Invalid criteria file {}", path.display()))?;

    println!("✓ {} is valid", path.display());
    println!("  Name: {}", criteria.display_name());
    println!("  Inclusion criteria: {}", criteria.inclusion_criteria.len());
    println!("  Exclusion criteria: {}", criteria.exclusion_criteria.len());
    println!("  Include keywords: {}", criteria.include_keywords.len());
    println!("  Exclude keywords: {}", criteria.exclude_keywords.len());
    if !criteria.study_types_exclude.is_empty() {
        println!("  Excluded study types: {}", criteria.study_types_exclude.len());
    }
    Ok(())
}

pub async fn check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let registry = ProviderRegistry::with_defaults();
    config.validate(&registry.available_types())?;

    println!("Confidence threshold: {:.2}", config.confidence_threshold);
    println!(
        "Backoff: {} attempt(s), {:?} to {:?}, jitter {:.0}%",
        config.max_attempts,
        config.base_delay,
        config.max_delay,
        config.jitter_fraction * 100.0
    );
    println!("Provider chain:");

    for id in &config.provider_priority {
        let provider_config = config.provider_config(id);
        match registry.validate(id, &provider_config) {
            Err(e) => println!("  ✗ {:<12} {}", id, e),
            Ok(()) => match registry.create(id, &provider_config) {
                Err(e) => println!("  ✗ {:<12} {}", id, e),
                Ok(provider) => {
                    let status = if provider.health_check().await {
                        "✓"
                    } else {
                        "?"
                    };
                    println!(
                        "  {} {:<12} {}",
                        status,
                        id,
                        registry.description(id).unwrap_or_default()
                    );
                }
            },
        }
    }
    println!("  ✓ {:<12} always available (last resort)", "rule-based");

    Ok(())
}
