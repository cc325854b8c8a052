use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    /// Static session cookies; when absent the `cookies` table is used
    #[serde(default)]
    pub session: Option<SessionConfig>,
    pub output: OutputConfig,
}

/// Crawl sequencing and request pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// First year crawled when no year is given on the command line
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last year crawled; the current year when unset
    #[serde(default)]
    pub end_year: Option<i32>,

    /// Prefix of generated application codes
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,

    /// Sequence number every year starts from
    #[serde(default = "default_start_sequence")]
    pub start_sequence: u32,

    /// Politeness delay between candidates (milliseconds)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Maximum outbound requests in any 60 second window
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Transport attempts per logical request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds (`base^attempt`)
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of candidates between progress reports
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Validation misses in a row that end a year
    #[serde(default = "default_max_consecutive_misses")]
    pub max_consecutive_misses: u32,

    /// Write one crawl-log row per validate/fetch attempt
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: None,
            code_prefix: default_code_prefix(),
            start_sequence: default_start_sequence(),
            request_delay_ms: default_request_delay_ms(),
            max_requests_per_minute: default_max_requests_per_minute(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_size: default_batch_size(),
            max_consecutive_misses: default_max_consecutive_misses(),
            audit_log: true,
        }
    }
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Static proxies as `host:port`
    #[serde(default)]
    pub list: Vec<String>,

    /// Credentials shared by the static proxies
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Successful requests served by one proxy before rotating
    #[serde(default = "default_max_requests_per_proxy")]
    pub max_requests_per_proxy: u32,

    /// Liveness probe target
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Liveness probe timeout (seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Merge the active rows of the `proxies` table into the pool
    #[serde(default = "default_true")]
    pub load_from_database: bool,
}

impl ProxyConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            username: String::new(),
            password: String::new(),
            max_requests_per_proxy: default_max_requests_per_proxy(),
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
            load_from_database: true,
        }
    }
}

/// Fixed header profile sent with every request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
        }
    }
}

/// Registry endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortalConfig {
    /// Existence probe, answered with a JSON array of suggestions
    #[serde(default = "default_validate_url")]
    pub validate_url: String,

    /// Query parameter carrying the candidate code
    #[serde(default = "default_validate_param")]
    pub validate_param: String,

    /// Record endpoint, POSTed as a form and answered with XML
    #[serde(default = "default_fetch_url")]
    pub fetch_url: String,

    /// Form field carrying the filter expression
    #[serde(default = "default_fetch_field")]
    pub fetch_field: String,

    /// Filter expression, `{code}` is replaced by the candidate code
    #[serde(default = "default_fetch_filter")]
    pub fetch_filter: String,

    /// Optional JSON detail API, queried as `{detail-url}/{number}`
    #[serde(default)]
    pub detail_url: Option<String>,
}

impl PortalConfig {
    /// Renders the fetch filter for a code
    pub fn fetch_filter_for(&self, code: &str) -> String {
        self.fetch_filter.replace("{code}", code)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            validate_url: default_validate_url(),
            validate_param: default_validate_param(),
            fetch_url: default_fetch_url(),
            fetch_field: default_fetch_field(),
            fetch_filter: default_fetch_filter(),
            detail_url: None,
        }
    }
}

/// Session cookies copied by an operator from a logged-in browser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Value of the `PSUSR` cookie
    pub primary_token: String,
    /// Value of the `JSESSIONID` cookie
    pub session_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

fn default_start_year() -> i32 {
    1984
}

fn default_code_prefix() -> String {
    crate::state::DEFAULT_CODE_PREFIX.to_string()
}

fn default_start_sequence() -> u32 {
    2
}

fn default_request_delay_ms() -> u64 {
    50
}

fn default_max_requests_per_minute() -> u32 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_consecutive_misses() -> u32 {
    1
}

fn default_max_requests_per_proxy() -> u32 {
    20
}

fn default_probe_url() -> String {
    "https://wipopublish.ipvietnam.gov.vn".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_accept() -> String {
    "application/json, text/xml, */*".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_validate_url() -> String {
    "https://wipopublish.ipvietnam.gov.vn/wopublish-search/service/suggest/trademarks".to_string()
}

fn default_validate_param() -> String {
    "term".to_string()
}

fn default_fetch_url() -> String {
    "https://wipopublish.ipvietnam.gov.vn/wopublish-search/service/trademarks/detail".to_string()
}

fn default_fetch_field() -> String {
    "query".to_string()
}

fn default_fetch_filter() -> String {
    "AFNB_ORI:({code})".to_string()
}

fn default_true() -> bool {
    true
}
