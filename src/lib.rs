//! vntm-crawler: a resilient crawler for the Vietnamese trademark registry
//!
//! This crate walks the registry by guessing sequential application codes
//! (`VN-4-{year}-{sequence}`), validating each one, fetching its record and
//! persisting it. The interesting part is the request engine: a rotating,
//! health-checked proxy pool, a per-minute rate limiter, retry with
//! exponential backoff, session-cookie injection, and the validate→fetch
//! sequencing that decides when a year has been exhausted.

pub mod config;
pub mod crawler;
pub mod output;
pub mod proxy;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;

use state::OutcomeKind;
use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Transport failure for {url} after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Session rejected by {url} (HTTP {status}), registry cookies must be refreshed")]
    AuthExpired { url: String, status: u16 },

    #[error("No working proxy available for {url}")]
    ProxyExhausted { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Parse error for {code}: {message}")]
    Parse { code: String, message: String },

    #[error("Invalid candidate code: {0}")]
    InvalidCode(String),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Maps an error onto the outcome recorded in the crawl log
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::AuthExpired { .. } => OutcomeKind::AuthExpired,
            Self::Parse { .. } => OutcomeKind::ParseError,
            Self::HttpStatus { status: 404, .. } => OutcomeKind::NotFound,
            _ => OutcomeKind::TransportError,
        }
    }

    /// Returns true for errors that must stop the whole run
    ///
    /// Expired credentials need an operator, an exhausted pool will fail
    /// every following request too, and cancellation was asked for.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired { .. } | Self::ProxyExhausted { .. } | Self::Cancelled
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSequencer, RequestExecutor};
pub use proxy::{ProxyPool, ProxyRecord};
pub use state::{CandidateCode, CrawlOutcome, Phase};
pub use storage::TrademarkRecord;
