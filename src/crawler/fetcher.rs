//! HTTP transport
//!
//! This module performs the actual network calls for the crawler:
//! - Building one reqwest client per proxy (the proxy serves HTTP and HTTPS)
//! - Liveness probes against the configured probe URL
//! - Sending GET and form-encoded POST requests
//! - Classifying low-level failures
//!
//! Retry, rotation and rate limiting live in the executor; a transport only
//! reports what happened to a single attempt.

use crate::config::Config;
use crate::proxy::ProxyRecord;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// HTTP method of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request as the executor hands it to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Form fields, sent url-encoded in the body
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            form,
            ..Self::get(url)
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a form field
    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Kind of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    Other,
}

/// A request that never produced a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else if error.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Other
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Timeout => write!(f, "timeout: {}", self.message),
            FailureKind::Connect => write!(f, "connection failed: {}", self.message),
            FailureKind::Other => write!(f, "{}", self.message),
        }
    }
}

/// Network seam used by the proxy pool and the executor
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns true if the proxy answers the liveness probe with a 2xx
    async fn probe(&self, proxy: &ProxyRecord) -> bool;

    /// Sends one request through the proxy
    async fn send(
        &self,
        proxy: &ProxyRecord,
        request: &OutboundRequest,
    ) -> Result<RawResponse, TransportFailure>;
}

/// Builds an HTTP client routed through `proxy`
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use vntm_crawler::crawler::build_http_client;
/// use vntm_crawler::proxy::ProxyRecord;
///
/// let proxy = ProxyRecord::new("10.0.0.1", 8080, "user", "pass");
/// let client = build_http_client(&proxy, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(proxy: &ProxyRecord, timeout: Duration) -> crate::Result<Client> {
    let proxy_url = proxy.url()?;

    let client = Client::builder()
        .proxy(Proxy::all(proxy_url.as_str())?)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// reqwest-backed transport
///
/// Clients are cached per proxy URL so connections are reused.
pub struct ReqwestTransport {
    clients: Mutex<HashMap<String, Client>>,
    request_timeout: Duration,
    probe_url: String,
    probe_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration, probe_url: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            request_timeout,
            probe_url: probe_url.into(),
            probe_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.crawler.request_timeout(),
            config.proxy.probe_url.clone(),
            config.proxy.probe_timeout(),
        )
    }

    fn client_for(&self, proxy: &ProxyRecord) -> Result<Client, TransportFailure> {
        let key = format!("{}@{}", proxy.username, proxy.label());
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(proxy, self.request_timeout)
            .map_err(|e| TransportFailure::new(FailureKind::Other, e.to_string()))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn probe(&self, proxy: &ProxyRecord) -> bool {
        let client = match self.client_for(proxy) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Cannot build client for {}: {}", proxy.label(), e);
                return false;
            }
        };

        match client
            .get(&self.probe_url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Probe through {} failed: {}", proxy.label(), e);
                false
            }
        }
    }

    async fn send(
        &self,
        proxy: &ProxyRecord,
        request: &OutboundRequest,
    ) -> Result<RawResponse, TransportFailure> {
        let client = self.client_for(proxy)?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(TransportFailure::from_reqwest)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(TransportFailure::from_reqwest)?;

        Ok(RawResponse { status, body })
    }
}
