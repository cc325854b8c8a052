//! Fixed-window rate limiting for outbound requests
//!
//! One window is 60 seconds long. Callers run `check_and_wait` before every
//! logical request; once the window's budget is spent the call sleeps until
//! the window ends and then opens a fresh one. There is a single caller, so
//! there is no queueing or fairness.

use crate::crawler::pause;
use crate::Result;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Accounting for the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests counted in this window
    pub count: u32,
    pub started_at: Instant,
}

/// Per-minute request limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window_length: Duration,
    window: RateWindow,
}

impl RateLimiter {
    /// Length of a rate window
    pub const WINDOW: Duration = Duration::from_secs(60);

    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            max_per_window: max_requests_per_minute.max(1),
            window_length: Self::WINDOW,
            window: RateWindow {
                count: 0,
                started_at: Instant::now(),
            },
        }
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Returns the current window
    pub fn window(&self) -> RateWindow {
        self.window
    }

    /// Counts one request, sleeping first if the window is exhausted
    ///
    /// The sleep is abandoned with `CrawlError::Cancelled` when `cancel`
    /// fires; the window is left as it was.
    pub async fn check_and_wait(&mut self, cancel: &CancellationToken) -> Result<()> {
        let elapsed = self.window.started_at.elapsed();
        if elapsed > self.window_length {
            self.reset();
        }

        if self.window.count >= self.max_per_window {
            let remaining = self.window_length.saturating_sub(self.window.started_at.elapsed());
            tracing::info!(
                "Rate limit of {} requests/min reached, waiting {:.1}s",
                self.max_per_window,
                remaining.as_secs_f64()
            );
            pause(remaining, cancel).await?;
            self.reset();
        }

        self.window.count += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.window = RateWindow {
            count: 0,
            started_at: Instant::now(),
        };
    }
}
