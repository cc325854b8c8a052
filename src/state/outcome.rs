//! Crawl outcome definitions
//!
//! Every validate or fetch attempt produces one `CrawlOutcome`, which is
//! consumed by logging and the audit trail in storage.

use std::fmt;

/// The two phases of the crawl protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Lightweight existence probe for a candidate code
    Validate,

    /// Full record retrieval and parsing
    Fetch,
}

impl Phase {
    /// Converts the phase to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Fetch => "fetch",
        }
    }

    /// Parses a phase from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "validate" => Some(Self::Validate),
            "fetch" => Some(Self::Fetch),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Result of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// The code exists (validate) or the record was parsed (fetch)
    Success,

    /// The registry does not know the code
    NotFound,

    /// Connection, timeout or exhausted retries
    TransportError,

    /// The registry rejected the session cookies (HTTP 401/403)
    AuthExpired,

    /// The body could not be decoded into the expected shape
    ParseError,
}

impl OutcomeKind {
    /// Returns true if this represents a successful attempt
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Converts the outcome to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::TransportError => "transport_error",
            Self::AuthExpired => "auth_expired",
            Self::ParseError => "parse_error",
        }
    }

    /// Parses an outcome from its database string representation
    ///
    /// Returns None if the string doesn't match any known outcome.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "not_found" => Some(Self::NotFound),
            "transport_error" => Some(Self::TransportError),
            "auth_expired" => Some(Self::AuthExpired),
            "parse_error" => Some(Self::ParseError),
            _ => None,
        }
    }

    /// Returns all possible outcomes
    pub fn all() -> [Self; 5] {
        [
            Self::Success,
            Self::NotFound,
            Self::TransportError,
            Self::AuthExpired,
            Self::ParseError,
        ]
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Outcome of one attempt against one candidate code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub code: String,
    pub phase: Phase,
    pub result: OutcomeKind,
    /// Error detail for failed attempts
    pub detail: Option<String>,
    /// Proxy that served the request, when one was reached
    pub proxy: Option<String>,
}

impl CrawlOutcome {
    pub fn success(code: impl Into<String>, phase: Phase) -> Self {
        Self {
            code: code.into(),
            phase,
            result: OutcomeKind::Success,
            detail: None,
            proxy: None,
        }
    }

    pub fn failure(
        code: impl Into<String>,
        phase: Phase,
        result: OutcomeKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            phase,
            result,
            detail: Some(detail.into()),
            proxy: None,
        }
    }

    /// Attaches the label of the proxy that served the attempt
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}
