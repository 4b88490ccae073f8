//! Sliding-window rate limiter for outbound provider calls.
//!
//! Bounds the number of calls admitted within the trailing window. Callers
//! suspend in `acquire()` until there is headroom; the check and the
//! timestamp append happen under a single lock so two concurrent callers
//! can never both observe the same free slot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::config::LimiterConfig;

/// Sliding-window rate limiter. Shared process-wide across all jobs.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per trailing `window`.
    pub fn new(config: &LimiterConfig) -> Arc<Self> {
        Arc::new(Self {
            max_requests: config.max_requests,
            window: config.window,
            calls: Mutex::new(VecDeque::new()),
        })
    }

    /// Wait until a call may be issued, then record it and return.
    ///
    /// Capacity is reserved at the moment of permission (the timestamp is
    /// appended before the protected call runs, not after it completes).
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();

                // Lazily drop timestamps that have left the window.
                while calls
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.max_requests {
                    calls.push_back(now);
                    return;
                }

                // Window is full; a slot frees when the oldest call ages out.
                let oldest = calls[0];
                self.window - now.duration_since(oldest)
            };

            trace!(wait_ms = wait.as_millis() as u64, "Rate limiter window full");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of calls currently recorded inside the window.
    pub async fn in_window(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    fn limiter(max_requests: usize, window_secs: u64) -> Arc<RateLimiter> {
        RateLimiter::new(&LimiterConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_immediately() {
        let limiter = limiter(3, 10);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn third_call_waits_for_window() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // The third call cannot be admitted until the first leaves the window.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn bound_holds_under_concurrent_callers() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        join_all(tasks).await;

        // Five admissions at two per window take at least two full windows:
        // two at t=0, two at t=10, one at t=20.
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(limiter.in_window().await <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_after_elapse() {
        let limiter = limiter(1, 5);
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
