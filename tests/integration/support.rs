//! Shared fixtures for the integration tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use vntm_crawler::config::{apply_env_overrides, validate, Config};
use vntm_crawler::ConfigError;
use vntm_crawler::crawler::{
    CrawlSequencer, HttpMethod, OutboundRequest, RawResponse, RequestExecutor, Transport,
    TransportFailure,
};
use vntm_crawler::proxy::{ProxyPool, ProxyRecord};
use vntm_crawler::session::{LayeredCookieStore, SessionCredential, StaticCookieStore};
use vntm_crawler::storage::SharedStorage;

#[derive(Default)]
struct RegistryState {
    found: HashSet<String>,
    statuses: HashMap<String, String>,
    requests: Vec<OutboundRequest>,
}

/// In-process stand-in for the registry
///
/// Answers the suggestion endpoint for the codes it knows and serves an XML
/// record for every fetch. Clones share state, so a test can keep a handle
/// after moving one into the executor.
#[derive(Clone, Default)]
pub struct RegistryTransport {
    state: Arc<Mutex<RegistryState>>,
}

impl RegistryTransport {
    pub fn with_codes(codes: &[&str]) -> Self {
        let transport = Self::default();
        {
            let mut state = transport.state.lock().unwrap();
            state.found = codes.iter().map(|c| c.to_string()).collect();
        }
        transport
    }

    pub fn set_status(&self, code: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(code.to_string(), status.to_string());
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Search terms sent to the suggestion endpoint, in order
    pub fn validated(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == HttpMethod::Get)
            .filter_map(|r| r.query_param("term").map(String::from))
            .collect()
    }
}

#[async_trait]
impl Transport for RegistryTransport {
    async fn probe(&self, _proxy: &ProxyRecord) -> bool {
        true
    }

    async fn send(
        &self,
        _proxy: &ProxyRecord,
        request: &OutboundRequest,
    ) -> Result<RawResponse, TransportFailure> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        match request.method {
            HttpMethod::Get => {
                let term = request.query_param("term").unwrap_or_default();
                let body = if state.found.contains(term) {
                    format!(r#"[{{"value":"{}","label":"{} LOTUS"}}]"#, term, term)
                } else {
                    "[]".to_string()
                };
                Ok(RawResponse::new(200, body))
            }
            HttpMethod::Post => {
                let code = request
                    .form_field("query")
                    .and_then(|filter| filter.split_once('('))
                    .and_then(|(_, rest)| rest.strip_suffix(')'))
                    .unwrap_or_default()
                    .to_string();
                let status = state
                    .statuses
                    .get(&code)
                    .cloned()
                    .unwrap_or_else(|| "Pending".to_string());
                Ok(RawResponse::new(200, record_xml(&code, &status)))
            }
        }
    }
}

/// Minimal portal document for `code`
pub fn record_xml(code: &str, status: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Transaction>
  <TradeMark>
    <ApplicationNumber>{code}</ApplicationNumber>
    <ApplicationDate>2020-01-06</ApplicationDate>
    <MarkCurrentStatusCode>{status}</MarkCurrentStatusCode>
    <MarkVerbalElementText>LOTUS</MarkVerbalElementText>
    <Applicant>
      <FreeFormatNameLine>Cong ty TNHH Sen Vang</FreeFormatNameLine>
    </Applicant>
    <ClassNumber>30</ClassNumber>
  </TradeMark>
</Transaction>"#
    )
}

/// Writes a config file into `dir` and returns its path
///
/// `extra` is appended verbatim, after the `[crawler]` keys.
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let db_path = dir.join("crawl.db");
    let content = format!(
        r#"
[crawler]
start-year = 2020
end-year = 2020
request-delay-ms = 0
{extra}

[proxy]
list = ["127.0.0.1:3128"]
username = "crawler"
password = "secret"
max-requests-per-proxy = 1000
load-from-database = false

[output]
database-path = "{}"
"#,
        db_path.display()
    );

    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// Loads a config file the way `load_config` does, ignoring the host environment
pub fn load_test_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |_| None);
    validate(&config)?;
    Ok(config)
}

/// Loads the config written by `write_config`
pub fn create_test_config(dir: &Path) -> Config {
    load_test_config(&write_config(dir, "")).unwrap()
}

/// Wires a sequencer over `transport` and `shared` the way the binary does
pub fn build_sequencer(
    config: &Config,
    transport: RegistryTransport,
    shared: &SharedStorage,
) -> CrawlSequencer<RegistryTransport> {
    let proxies = config
        .proxy
        .list
        .iter()
        .map(|entry| ProxyRecord::parse_entry(entry, &config.proxy.username, &config.proxy.password))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let pool = ProxyPool::from_proxies(proxies, config.proxy.max_requests_per_proxy)
        .with_registry(Box::new(shared.clone()));

    let cookies = LayeredCookieStore::new(
        shared.clone(),
        StaticCookieStore::new(config.session.as_ref().map(SessionCredential::from)),
    );
    let executor = RequestExecutor::from_config(
        config,
        transport,
        pool,
        Box::new(cookies),
        CancellationToken::new(),
    );

    CrawlSequencer::new(executor, Box::new(shared.clone()), config)
}
