//! Screening a list of articles in order.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use sieve_core::{Article, Criteria, ScreeningDecision};

use crate::config::article_limit;
use crate::orchestrator::{FallbackOrchestrator, ScreeningOutcome};

/// Confidence counted as high in the summary.
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Why a session ended before the last article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    LimitReached,
}

/// Counts over the articles screened in one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Articles screened in this session
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
    pub maybe: usize,
    pub mean_confidence: f64,
    pub high_confidence: usize,
    pub downgraded: usize,
    pub fallback_events: usize,

    /// Articles that already had a decision
    pub skipped: usize,

    pub stopped: Option<StopReason>,
}

impl SessionSummary {
    fn add(&mut self, outcome: &ScreeningOutcome) {
        match outcome.decision {
            ScreeningDecision::Include => self.included += 1,
            ScreeningDecision::Exclude => self.excluded += 1,
            ScreeningDecision::Maybe => self.maybe += 1,
        }
        if outcome.confidence >= HIGH_CONFIDENCE {
            self.high_confidence += 1;
        }
        if outcome.downgraded {
            self.downgraded += 1;
        }
        self.fallback_events += outcome.fallback_events.len();

        self.total += 1;
        self.mean_confidence += (outcome.confidence - self.mean_confidence) / self.total as f64;
    }
}

/// Runs the orchestrator over articles one at a time.
///
/// The article limit and the cancel flag are checked between articles
/// only; a provider call in flight always completes.
pub struct ScreeningSession<'a> {
    orchestrator: &'a FallbackOrchestrator,
    criteria: &'a Criteria,
    max_articles: Option<usize>,
    cancel: Arc<AtomicBool>,
}

impl<'a> ScreeningSession<'a> {
    pub fn new(orchestrator: &'a FallbackOrchestrator, criteria: &'a Criteria) -> Self {
        Self {
            orchestrator,
            criteria,
            max_articles: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `None` or `Some(0)` screens everything.
    pub fn with_max_articles(mut self, max_articles: Option<usize>) -> Self {
        self.max_articles = max_articles.and_then(article_limit);
        self
    }

    /// Share an externally controlled cancel flag.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Screen `articles` in order, recording each decision on its article.
    ///
    /// `on_outcome` sees each article with its outcome as soon as it is
    /// screened.
    pub async fn run<F>(&self, articles: &mut [Article], mut on_outcome: F) -> SessionSummary
    where
        F: FnMut(usize, &Article, &ScreeningOutcome),
    {
        let mut summary = SessionSummary::default();

        for (index, article) in articles.iter_mut().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                info!(screened = summary.total, "Session cancelled");
                summary.stopped = Some(StopReason::Cancelled);
                break;
            }
            if self.max_articles.is_some_and(|max| summary.total >= max) {
                info!(screened = summary.total, "Article limit reached");
                summary.stopped = Some(StopReason::LimitReached);
                break;
            }
            if article.is_screened() {
                summary.skipped += 1;
                continue;
            }

            let outcome = self.orchestrator.screen(article, self.criteria).await;
            if let Err(e) = article.record(outcome.to_record()) {
                warn!(article = %article.label(), error = %e, "Decision not recorded");
            }
            on_outcome(index, article, &outcome);
            summary.add(&outcome);
        }

        summary
    }
}
