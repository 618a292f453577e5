//! Bounded retry with exponential backoff and jitter.
//!
//! The delay before attempt `n + 1` is `min(max_delay, base_delay × 2^(n−1))`
//! scaled by `1 ± jitter_fraction`. Delays never shrink from one retry to
//! the next and never exceed `max_delay`. No delay precedes the first
//! attempt.

use backon::{BackoffBuilder, Retryable};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use sieve_core::{Article, Criteria, JudgmentResult};

use crate::providers::{
    Attempt, FailureKind, JudgmentProvider, ProviderFailure, ProviderOutcome,
};

/// Retry policy for one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative spread in `[0, 1)`
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry that follows failed attempt `attempt`, without
    /// jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The delays this policy would sleep, one per retry.
    pub fn schedule(&self) -> BackoffSchedule {
        self.clone().build()
    }
}

impl BackoffBuilder for BackoffPolicy {
    type Backoff = BackoffSchedule;

    fn build(self) -> Self::Backoff {
        BackoffSchedule {
            policy: self,
            attempt: 0,
            previous: Duration::ZERO,
        }
    }
}

/// Iterator over retry delays.
#[derive(Debug)]
pub struct BackoffSchedule {
    policy: BackoffPolicy,
    attempt: u32,
    previous: Duration,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;

        let nominal = self.policy.nominal_delay(self.attempt);
        let jitter = self.policy.jitter_fraction.clamp(0.0, 0.999);
        let jittered = if jitter > 0.0 {
            let spread = 1.0 + jitter * (2.0 * rand::random::<f64>() - 1.0);
            nominal.mul_f64(spread).min(self.policy.max_delay)
        } else {
            nominal
        };

        let delay = jittered.max(self.previous);
        self.previous = delay;
        Some(delay)
    }
}

#[derive(Debug)]
enum CallError {
    Transient(ProviderFailure),
    Fatal(ProviderFailure),
}

/// Runs one provider call under a [`BackoffPolicy`].
///
/// Transient failures are retried until the attempt ceiling; a parse
/// failure gets one retry with the strict prompt. Fatal failures return
/// immediately. Whatever is still failing at the end is reported as fatal,
/// so callers never see a transient outcome.
#[derive(Debug, Clone, Default)]
pub struct BackoffController {
    policy: BackoffPolicy,
}

impl BackoffController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub async fn call(
        &self,
        provider: &dyn JudgmentProvider,
        article: &Article,
        criteria: &Criteria,
    ) -> ProviderOutcome {
        let attempts = AtomicU32::new(0);
        let parse_failures = AtomicU32::new(0);
        let (attempts, parse_failures) = (&attempts, &parse_failures);

        let result = (move || async move {
            let attempt = Attempt {
                number: attempts.fetch_add(1, Ordering::SeqCst) + 1,
                after_parse_failure: parse_failures.load(Ordering::SeqCst) > 0,
            };

            match provider.evaluate(article, criteria, attempt).await {
                ProviderOutcome::Success(judgment) => Ok::<JudgmentResult, CallError>(judgment),
                ProviderOutcome::TransientFailure(failure) => {
                    if failure.kind == FailureKind::ParseFailure {
                        parse_failures.fetch_add(1, Ordering::SeqCst);
                    }
                    debug!(
                        provider = provider.name(),
                        attempt = attempt.number,
                        failure = %failure,
                        "Transient provider failure"
                    );
                    Err(CallError::Transient(failure))
                }
                ProviderOutcome::FatalFailure(failure) => Err(CallError::Fatal(failure)),
            }
        })
        .retry(self.policy.clone())
        .sleep(tokio::time::sleep)
        .when(|e| match e {
            CallError::Transient(_) => parse_failures.load(Ordering::SeqCst) < 2,
            CallError::Fatal(_) => false,
        })
        .notify(|e, delay| {
            if let CallError::Transient(failure) = e {
                warn!(
                    provider = provider.name(),
                    delay = ?delay,
                    kind = %failure.kind,
                    "Retrying provider call"
                );
            }
        })
        .await;

        match result {
            Ok(judgment) => ProviderOutcome::Success(judgment),
            Err(CallError::Fatal(failure)) => ProviderOutcome::FatalFailure(failure),
            Err(CallError::Transient(last)) => {
                ProviderOutcome::FatalFailure(ProviderFailure::new(
                    FailureKind::RetriesExhausted,
                    format!(
                        "gave up after {} attempt(s), last failure {}",
                        attempts.load(Ordering::SeqCst),
                        last
                    ),
                ))
            }
        }
    }
}
