//! Test doubles shared by the unit tests
//!
//! - `ScriptedTransport`: a `Transport` answering from closures and recording
//!   every probe and request
//! - `RecordingRegistry`: a `ProxyRegistry` that remembers health updates
//! - `MemoryPersistence`: an in-memory `Persistence` that can be told to fail

use crate::crawler::{
    FailureKind, HttpMethod, OutboundRequest, RawResponse, Transport, TransportFailure,
};
use crate::proxy::{ProxyRecord, ProxyRegistry};
use crate::state::CrawlOutcome;
use crate::storage::{Persistence, RunStatus, StorageError, StorageResult, TrademarkRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

type Handler =
    dyn Fn(&ProxyRecord, &OutboundRequest) -> Result<RawResponse, TransportFailure> + Send + Sync;
type Probe = dyn Fn(&ProxyRecord) -> bool + Send + Sync;

/// Builds a registry fetch response for one record
pub fn trademark_xml(code: &str, name: &str, status: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Transaction>
  <TradeMarkTransactionBody>
    <TradeMark>
      <ApplicationNumber>{code}</ApplicationNumber>
      <ApplicationDate>2020-01-06</ApplicationDate>
      <PublicationDate>2020-03-25</PublicationDate>
      <RegistrationNumber>4-0351234-000</RegistrationNumber>
      <RegistrationDate>2021-02-01</RegistrationDate>
      <MarkCurrentStatusCode>{status}</MarkCurrentStatusCode>
      <WordMarkSpecification>
        <MarkVerbalElementText>{name}</MarkVerbalElementText>
      </WordMarkSpecification>
      <MarkImageDetails>
        <MarkImageURI>https://wipopublish.ipvietnam.gov.vn/images/{code}.jpg</MarkImageURI>
      </MarkImageDetails>
      <ApplicantDetails>
        <Applicant>
          <FreeFormatNameLine>Cong ty TNHH Sen Vang</FreeFormatNameLine>
          <FreeFormatAddressLine>12 Le Loi, Ha Noi</FreeFormatAddressLine>
        </Applicant>
      </ApplicantDetails>
      <GoodsServicesDetails>
        <ClassDescription>
          <ClassNumber>30</ClassNumber>
          <GoodsServicesDescription>Tea; coffee</GoodsServicesDescription>
        </ClassDescription>
        <ClassDescription>
          <ClassNumber>43</ClassNumber>
          <GoodsServicesDescription>Cafe services</GoodsServicesDescription>
        </ClassDescription>
      </GoodsServicesDetails>
    </TradeMark>
  </TradeMarkTransactionBody>
</Transaction>"#
    )
}

/// Transport answering from closures
pub struct ScriptedTransport {
    handler: Box<Handler>,
    probe: Box<Probe>,
    sent: Mutex<Vec<(String, OutboundRequest)>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ProxyRecord, &OutboundRequest) -> Result<RawResponse, TransportFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            probe: Box::new(|_| true),
            sent: Mutex::new(Vec::new()),
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Every request succeeds with `body`
    pub fn ok(body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_, _| Ok(RawResponse::new(200, body.clone())))
    }

    /// Every request gets `status`
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_, _| Ok(RawResponse::new(status, body.clone())))
    }

    /// Every request fails to connect
    pub fn failing() -> Self {
        Self::new(|_, _| Err(TransportFailure::new(FailureKind::Connect, "connection refused")))
    }

    /// Answers in order; once the script runs out every request times out
    pub fn script(responses: Vec<Result<RawResponse, TransportFailure>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportFailure::new(FailureKind::Timeout, "script exhausted")))
        })
    }

    /// Emulates the registry portal
    ///
    /// The validate call reports a code as existing when `found` says so;
    /// the fetch call returns a record for whatever code the filter names.
    pub fn portal<F>(found: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(move |_, request| match request.method {
            HttpMethod::Get => {
                let term = request.query_param("term").unwrap_or_default();
                let body = if found(term) {
                    format!(r#"[{{"value":"{}","label":"{}"}}]"#, term, term)
                } else {
                    "[]".to_string()
                };
                Ok(RawResponse::new(200, body))
            }
            HttpMethod::Post => {
                let filter = request.form_field("query").unwrap_or_default();
                let code = filter
                    .split_once('(')
                    .and_then(|(_, rest)| rest.strip_suffix(')'))
                    .unwrap_or_default();
                Ok(RawResponse::new(200, trademark_xml(code, "LOTUS", "Pending")))
            }
        })
    }

    /// Replaces the liveness probe
    pub fn with_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn(&ProxyRecord) -> bool + Send + Sync + 'static,
    {
        self.probe = Box::new(probe);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().unwrap().len()
    }

    /// Labels of the probed proxies, in order
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Requests sent, in order
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Labels of the proxies each request went through, in order
    pub fn sent_via(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn probe(&self, proxy: &ProxyRecord) -> bool {
        self.probed.lock().unwrap().push(proxy.label());
        (self.probe)(proxy)
    }

    async fn send(
        &self,
        proxy: &ProxyRecord,
        request: &OutboundRequest,
    ) -> Result<RawResponse, TransportFailure> {
        self.sent
            .lock()
            .unwrap()
            .push((proxy.label(), request.clone()));
        (self.handler)(proxy, request)
    }
}

/// Proxy registry remembering every health update
#[derive(Clone, Default)]
pub struct RecordingRegistry {
    active: Vec<ProxyRecord>,
    updates: Arc<Mutex<Vec<ProxyRecord>>>,
}

impl RecordingRegistry {
    pub fn with_active(active: Vec<ProxyRecord>) -> Self {
        Self {
            active,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<ProxyRecord> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProxyRegistry for RecordingRegistry {
    fn active_proxies(&self) -> StorageResult<Vec<ProxyRecord>> {
        Ok(self.active.clone())
    }

    fn record_proxy_health(&mut self, proxy: &ProxyRecord) -> StorageResult<()> {
        self.updates.lock().unwrap().push(proxy.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    records: BTreeMap<String, (i64, TrademarkRecord)>,
    history: Vec<(i64, String)>,
    logs: Vec<CrawlOutcome>,
    runs: BTreeMap<i64, (String, RunStatus)>,
    fail_writes: bool,
}

/// In-memory persistence; clones share the same state
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPersistence {
    /// Makes every subsequent write fail
    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn insert(&self, record: TrademarkRecord) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.records.insert(record.code.clone(), (id, record));
    }

    /// Stored codes in code order
    pub fn codes(&self) -> Vec<String> {
        self.state.lock().unwrap().records.keys().cloned().collect()
    }

    pub fn record(&self, code: &str) -> Option<TrademarkRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(code)
            .map(|(_, r)| r.clone())
    }

    /// Appended statuses, in order
    pub fn history(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .history
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn logs(&self) -> Vec<CrawlOutcome> {
        self.state.lock().unwrap().logs.clone()
    }

    fn check_writable(state: &MemoryState) -> StorageResult<()> {
        if state.fail_writes {
            return Err(StorageError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
                Some("disk I/O error".to_string()),
            )));
        }
        Ok(())
    }
}

impl Persistence for MemoryPersistence {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state)?;
        let id = state.runs.len() as i64 + 1;
        state
            .runs
            .insert(id, (config_hash.to_string(), RunStatus::Running));
        Ok(id)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state)?;
        match state.runs.get_mut(&run_id) {
            Some(run) => {
                run.1 = status;
                Ok(())
            }
            None => Err(StorageError::RunNotFound(run_id)),
        }
    }

    fn upsert_record(&mut self, record: &TrademarkRecord) -> StorageResult<i64> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state)?;
        if let Some((id, stored)) = state.records.get_mut(&record.code) {
            *stored = record.clone();
            return Ok(*id);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.records.insert(record.code.clone(), (id, record.clone()));
        Ok(id)
    }

    fn get_record(&self, code: &str) -> StorageResult<Option<TrademarkRecord>> {
        Ok(self.record(code))
    }

    fn records_with_status(&self, status: &str) -> StorageResult<Vec<TrademarkRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|(_, r)| r.status.as_deref() == Some(status))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn last_sequence(&self, prefix: &str, year: i32) -> StorageResult<Option<u32>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|(_, r)| r.prefix == prefix && r.year == year)
            .map(|(_, r)| r.sequence)
            .max())
    }

    fn append_status_history(
        &mut self,
        record_id: i64,
        status: &str,
        _notes: Option<&str>,
    ) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state)?;
        state.history.push((record_id, status.to_string()));
        Ok(())
    }

    fn append_crawl_log(&mut self, outcome: &CrawlOutcome) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state)?;
        state.logs.push(outcome.clone());
        Ok(())
    }
}
