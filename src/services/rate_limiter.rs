//! Rolling-window rate limiter shared by every provider call of a run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Limits request starts to `limit` per rolling `window`
///
/// Every granted request records its start time. A request is granted only
/// if fewer than `limit` starts fall inside the trailing window; otherwise the
/// caller waits until the oldest start leaves the window. Callers block, they
/// never fail.
#[derive(Clone)]
pub struct RollingWindowLimiter {
    limit: usize,
    window: Duration,
    starts: Arc<Mutex<VecDeque<Instant>>>,
}

impl RollingWindowLimiter {
    /// Create a limiter allowing `limit` request starts per `window`.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            starts: Arc::new(Mutex::new(VecDeque::with_capacity(limit.max(1)))),
        }
    }

    /// Create a limiter for `requests_per_minute` starts per rolling minute.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute as usize, Duration::from_secs(60))
    }

    /// Wait until a request may start, then record it.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = starts.front() {
                    if now.duration_since(oldest) >= self.window {
                        starts.pop_front();
                    } else {
                        break;
                    }
                }

                if starts.len() < self.limit {
                    starts.push_back(now);
                    return;
                }

                // Full window: the oldest start frees a slot when it expires
                match starts.front() {
                    Some(&oldest) => oldest + self.window,
                    None => now,
                }
            };

            trace!(
                wait_ms = wait_until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "rate limit reached, waiting for window slot"
            );
            sleep_until(wait_until).await;
        }
    }

    /// Request starts currently inside the window.
    pub async fn in_flight_window(&self) -> usize {
        let starts = self.starts.lock().await;
        let now = Instant::now();
        starts
            .iter()
            .filter(|&&start| now.duration_since(start) < self.window)
            .count()
    }

    /// Maximum starts per window.
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_limit_is_immediate() {
        let limiter = RollingWindowLimiter::per_minute(5);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight_window().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_request_waits_for_window() {
        let limiter = RollingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_limit_under_contention() {
        let limiter = RollingWindowLimiter::new(3, Duration::from_secs(10));
        let origin = Instant::now();
        let mut handles = Vec::new();

        for _ in 0..9 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        // Grants `limit` positions apart are at least one window apart
        for pair in starts.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_secs(10));
        }
        assert!(starts[8].duration_since(origin) >= Duration::from_secs(20));
    }
}
