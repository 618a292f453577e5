//! Sliding-window request pacing for rate-limited backends.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Allows at most `max_calls` requests in any `window`.
///
/// [`acquire`](Self::acquire) waits for a free slot instead of failing.
#[derive(Debug)]
pub struct RequestPacer {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RequestPacer {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1) as usize,
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Wait until a request may be sent, then record it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock();
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }

                match calls.front() {
                    Some(oldest) if calls.len() >= self.max_calls => {
                        self.window - now.duration_since(*oldest)
                    }
                    _ => {
                        calls.push_back(now);
                        return;
                    }
                }
            };

            debug!(wait = ?wait, max_calls = self.max_calls, "Request pacer waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window.
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.calls
            .lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
