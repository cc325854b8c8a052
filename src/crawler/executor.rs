//! Authenticated, rate-limited, retried request execution
//!
//! `RequestExecutor::execute` performs one logical registry request:
//! 1. count it against the rate limiter (once, however many attempts follow)
//! 2. pick a working proxy from the pool
//! 3. attach the header profile and the active session cookie
//! 4. send, and classify the answer
//!
//! Transport-level failures (connect, timeout, 5xx, 429) mark the proxy
//! unhealthy, rotate the pool and are retried with exponential backoff.
//! 401/403 means the session cookies are stale and is never retried.

use crate::config::{Config, CrawlerConfig, HttpConfig};
use crate::crawler::{pause, OutboundRequest, RateLimiter, Transport};
use crate::proxy::ProxyPool;
use crate::session::CookieStore;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt budget and backoff of one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_secs: u64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_base_secs,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base_secs)
    }

    /// Delay after the failed attempt `attempt` (zero-based): `base^attempt` seconds
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// A 2xx answer and the proxy that served it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedResponse {
    pub status: u16,
    pub body: String,
    /// Label of the proxy the request went through
    pub proxy: String,
}

/// Executes registry requests over a `Transport`
pub struct RequestExecutor<T> {
    transport: T,
    pool: ProxyPool,
    limiter: RateLimiter,
    cookies: Box<dyn CookieStore>,
    headers: HttpConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
    warned_expired: bool,
    last_proxy: Option<String>,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(
        transport: T,
        pool: ProxyPool,
        limiter: RateLimiter,
        cookies: Box<dyn CookieStore>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            pool,
            limiter,
            cookies,
            headers: HttpConfig::default(),
            retry,
            cancel,
            warned_expired: false,
            last_proxy: None,
        }
    }

    /// Creates an executor with the limits and header profile of `config`
    pub fn from_config(
        config: &Config,
        transport: T,
        pool: ProxyPool,
        cookies: Box<dyn CookieStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            transport,
            pool,
            RateLimiter::new(config.crawler.max_requests_per_minute),
            cookies,
            RetryPolicy::from_config(&config.crawler),
            cancel,
        )
        .with_headers(config.http.clone())
    }

    /// Replaces the header profile
    pub fn with_headers(mut self, headers: HttpConfig) -> Self {
        self.headers = headers;
        self
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ProxyPool {
        &mut self.pool
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Label of the proxy used by the latest attempt
    pub fn last_proxy(&self) -> Option<&str> {
        self.last_proxy.as_deref()
    }

    /// Performs one logical request
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutedResponse)` - a 2xx answer
    /// * `Err(CrawlError::AuthExpired)` - 401/403, not retried
    /// * `Err(CrawlError::HttpStatus)` - any other non-2xx that is not retried
    /// * `Err(CrawlError::ProxyExhausted)` - no proxy passed its probe
    /// * `Err(CrawlError::Transport)` - every attempt failed at transport level
    /// * `Err(CrawlError::Cancelled)` - the cancel token fired while waiting
    pub async fn execute(&mut self, request: OutboundRequest) -> Result<ExecutedResponse> {
        self.limiter.check_and_wait(&self.cancel).await?;

        let request = self.prepare(request);
        let url = request.url.clone();
        let mut last_failure = String::new();
        self.last_proxy = None;

        for attempt in 0..self.retry.max_retries {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let Some(proxy) = self.pool.get_working_proxy(&self.transport).await else {
                return Err(CrawlError::ProxyExhausted { url });
            };
            self.last_proxy = Some(proxy.record.label());

            tracing::debug!(
                "{:?} {} via {} (attempt {}/{})",
                request.method,
                url,
                proxy.record.label(),
                attempt + 1,
                self.retry.max_retries
            );

            let failure = match self.transport.send(&proxy.record, &request).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    self.pool.mark_used(&proxy);
                    return Ok(ExecutedResponse {
                        status: response.status,
                        body: response.body,
                        proxy: proxy.record.label(),
                    });
                }
                Ok(response) if response.status == 401 || response.status == 403 => {
                    tracing::error!(
                        "HTTP {} from {}: session cookies were rejected",
                        response.status,
                        url
                    );
                    return Err(CrawlError::AuthExpired {
                        url,
                        status: response.status,
                    });
                }
                Ok(response) if response.status == 429 || response.status >= 500 => {
                    format!("HTTP {}", response.status)
                }
                Ok(response) => {
                    return Err(CrawlError::HttpStatus {
                        url,
                        status: response.status,
                    });
                }
                Err(failure) => failure.to_string(),
            };

            tracing::warn!(
                "Attempt {}/{} for {} via {} failed: {}",
                attempt + 1,
                self.retry.max_retries,
                url,
                proxy.record.label(),
                failure
            );
            self.pool.record_result(&proxy, false);
            self.pool.rotate();
            last_failure = failure;

            if attempt + 1 < self.retry.max_retries {
                let delay = self.retry.backoff_delay(attempt);
                tracing::debug!("Backing off {:?} before retrying {}", delay, url);
                pause(delay, &self.cancel).await?;
            }
        }

        Err(CrawlError::Transport {
            url,
            attempts: self.retry.max_retries,
            message: last_failure,
        })
    }

    /// Attaches the header profile and the session cookie
    ///
    /// Headers the caller already set are kept.
    fn prepare(&mut self, mut request: OutboundRequest) -> OutboundRequest {
        let profile = [
            ("User-Agent", self.headers.user_agent.clone()),
            ("Accept", self.headers.accept.clone()),
            ("Accept-Language", self.headers.accept_language.clone()),
        ];
        for (name, value) in profile {
            if request.header(name).is_none() {
                request = request.with_header(name, value);
            }
        }

        match self.cookies.active_session() {
            Ok(Some(session)) => {
                if session.is_expired(Utc::now()) && !self.warned_expired {
                    tracing::warn!(
                        "Session cookies expired at {:?}, sending them anyway",
                        session.expires_at
                    );
                    self.warned_expired = true;
                }
                if request.header("Cookie").is_none() {
                    request = request.with_header("Cookie", session.cookie_header());
                }
            }
            Ok(None) => {
                tracing::debug!("No active session, sending {} without cookies", request.url);
            }
            Err(e) => {
                tracing::warn!("Failed to read session cookies: {}", e);
            }
        }

        request
    }
}
