//! Crawler module: the request engine and the crawl protocol
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport through proxies
//! - Per-minute rate limiting
//! - Retried, authenticated request execution
//! - Parsing of validate, fetch and detail responses
//! - The validate→fetch sequencing over candidate codes

mod coordinator;
mod executor;
mod fetcher;
mod parser;
mod rate_limiter;
mod termination;

pub use coordinator::{CrawlSequencer, MonitorReport, YearReport};
pub use executor::{ExecutedResponse, RequestExecutor, RetryPolicy};
pub use fetcher::{
    build_http_client, FailureKind, HttpMethod, OutboundRequest, RawResponse, ReqwestTransport,
    Transport, TransportFailure,
};
pub use parser::{parse_detail_json, parse_record_xml, parse_validate_response};
pub use rate_limiter::{RateLimiter, RateWindow};
pub use termination::{ConsecutiveMisses, TerminationPolicy};

use crate::{CrawlError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `cancel` fires first
///
/// Every suspension point of a crawl goes through here, so a stop signal is
/// observed at each rate-limit wait, backoff and politeness delay.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CrawlError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CrawlError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
