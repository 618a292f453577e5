//! # sieve-runtime
//!
//! The screening engine: judgment providers, retry with backoff, the
//! fallback chain and the session runner.
//!
//! `sieve-core` holds the deterministic parts (criteria, rule-based
//! screening, response parsing, thresholding). This crate adds everything
//! that waits: model calls, retries and pacing.
//!
//! ## Guarantees
//!
//! - [`screen`] and [`FallbackOrchestrator::screen`] always return a
//!   decision. Only configuration errors are reported as errors.
//! - Providers are tried strictly one after another; a success
//!   short-circuits the rest.
//! - Retries are invisible above the backoff controller. A provider that
//!   keeps failing is reported as a fallback event.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sieve_runtime::{FallbackOrchestrator, ProviderRegistry, ScreeningConfig};
//!
//! let config = ScreeningConfig::from_file("sieve.yaml")?;
//! let orchestrator = FallbackOrchestrator::from_config(&config, &ProviderRegistry::with_defaults())?;
//!
//! let outcome = orchestrator.screen(&article, &criteria).await;
//! println!("{} ({:.2}) via {}", outcome.decision, outcome.confidence, outcome.provider);
//! ```

pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod session;

use thiserror::Error;

use sieve_core::{Article, Criteria, CriteriaError};

pub use config::{article_limit, ConfigError, ScreeningConfig};
pub use orchestrator::{FallbackEvent, FallbackOrchestrator, ScreeningOutcome};
pub use providers::{
    Attempt, FailureKind, JudgmentProvider, ProviderError, ProviderFailure, ProviderOutcome,
    ProviderRegistry,
};
pub use resilience::{BackoffController, BackoffPolicy, RequestPacer};
pub use session::{ScreeningSession, SessionSummary, StopReason};

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Criteria error: {0}")]
    Criteria(#[from] CriteriaError),
}

/// Screen one article with the built-in providers.
///
/// Builds the chain from `config` on every call; reuse a
/// [`FallbackOrchestrator`] when screening many articles.
pub async fn screen(
    article: &Article,
    criteria: &Criteria,
    config: &ScreeningConfig,
) -> Result<ScreeningOutcome, RuntimeError> {
    let orchestrator = FallbackOrchestrator::from_config(config, &ProviderRegistry::with_defaults())?;
    Ok(orchestrator.screen(article, criteria).await)
}
