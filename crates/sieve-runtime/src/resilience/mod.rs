//! Resilience patterns for sieve-runtime.
//!
//! This module provides:
//! - Retry with exponential backoff and jitter around one provider call
//! - Request pacing for rate-limited backends

mod backoff;
mod pacer;

pub use backoff::{BackoffController, BackoffPolicy, BackoffSchedule};
pub use pacer::RequestPacer;
