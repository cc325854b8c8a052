//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Trademark records and their status history
//! - The per-attempt crawl audit log
//! - The proxy registry and session cookies
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteStorage, StatusCount};
pub use traits::{Persistence, StorageError, StorageResult};

use crate::proxy::{ProxyRecord, ProxyRegistry};
use crate::session::{CookieStore, SessionCredential};
use crate::state::{CandidateCode, CrawlOutcome};
use crate::CrawlError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// One registry record, the single schema shared by every data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrademarkRecord {
    /// Application code, e.g. `VN-4-2020-00002`
    pub code: String,
    pub prefix: String,
    pub year: i32,
    pub sequence: u32,
    pub mark_name: Option<String>,
    /// Mark image URI as published by the registry
    pub mark_image: Option<String>,
    pub filing_date: Option<String>,
    pub publication_date: Option<String>,
    pub registration_number: Option<String>,
    pub registration_date: Option<String>,
    pub applicant_name: Option<String>,
    pub applicant_address: Option<String>,
    /// Nice classification numbers
    pub nice_classes: Vec<String>,
    pub nice_description: Option<String>,
    pub status: Option<String>,
    /// Response body the record was parsed from
    pub raw_payload: String,
}

impl TrademarkRecord {
    /// Creates an empty record for a candidate code
    pub fn from_code(code: &CandidateCode, raw_payload: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            prefix: code.prefix().to_string(),
            year: code.year(),
            sequence: code.sequence(),
            mark_name: None,
            mark_image: None,
            filing_date: None,
            publication_date: None,
            registration_number: None,
            registration_date: None,
            applicant_name: None,
            applicant_address: None,
            nice_classes: Vec::new(),
            nice_description: None,
            status: None,
            raw_payload: raw_payload.into(),
        }
    }

    /// Overlays the fields `newer` carries onto this record
    ///
    /// Identity fields (code, prefix, year, sequence) are never touched.
    /// Absent optional fields and an empty class list keep the stored value.
    ///
    /// # Returns
    ///
    /// True if any field changed
    pub fn merge(&mut self, newer: TrademarkRecord) -> bool {
        let before = self.clone();

        fn overlay(field: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *field = value;
            }
        }

        overlay(&mut self.mark_name, newer.mark_name);
        overlay(&mut self.mark_image, newer.mark_image);
        overlay(&mut self.filing_date, newer.filing_date);
        overlay(&mut self.publication_date, newer.publication_date);
        overlay(&mut self.registration_number, newer.registration_number);
        overlay(&mut self.registration_date, newer.registration_date);
        overlay(&mut self.applicant_name, newer.applicant_name);
        overlay(&mut self.applicant_address, newer.applicant_address);
        overlay(&mut self.nice_description, newer.nice_description);
        overlay(&mut self.status, newer.status);
        if !newer.nice_classes.is_empty() {
            self.nice_classes = newer.nice_classes;
        }
        if !newer.raw_payload.is_empty() {
            self.raw_payload = newer.raw_payload;
        }

        *self != before
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One SQLite connection shared by the proxy pool, the cookie store and the
/// sequencer
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<SqliteStorage>>,
}

impl SharedStorage {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Locks the underlying storage
    ///
    /// A poisoned lock is recovered; every write is a single statement or
    /// transaction, so the connection stays consistent.
    pub fn lock(&self) -> MutexGuard<'_, SqliteStorage> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Persistence for SharedStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.lock().create_run(config_hash)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.lock().finish_run(run_id, status)
    }

    fn upsert_record(&mut self, record: &TrademarkRecord) -> StorageResult<i64> {
        self.lock().upsert_record(record)
    }

    fn get_record(&self, code: &str) -> StorageResult<Option<TrademarkRecord>> {
        self.lock().get_record(code)
    }

    fn records_with_status(&self, status: &str) -> StorageResult<Vec<TrademarkRecord>> {
        self.lock().records_with_status(status)
    }

    fn last_sequence(&self, prefix: &str, year: i32) -> StorageResult<Option<u32>> {
        self.lock().last_sequence(prefix, year)
    }

    fn append_status_history(
        &mut self,
        record_id: i64,
        status: &str,
        notes: Option<&str>,
    ) -> StorageResult<()> {
        self.lock().append_status_history(record_id, status, notes)
    }

    fn append_crawl_log(&mut self, outcome: &CrawlOutcome) -> StorageResult<()> {
        self.lock().append_crawl_log(outcome)
    }
}

impl ProxyRegistry for SharedStorage {
    fn active_proxies(&self) -> StorageResult<Vec<ProxyRecord>> {
        self.lock().active_proxies()
    }

    fn record_proxy_health(&mut self, proxy: &ProxyRecord) -> StorageResult<()> {
        self.lock().record_proxy_health(proxy)
    }
}

impl CookieStore for SharedStorage {
    fn active_session(&self) -> StorageResult<Option<SessionCredential>> {
        self.lock().active_session()
    }
}
