//! Storage traits and error types
//!
//! This module defines the trait interface the crawl protocol persists
//! through, and the associated error types.

use crate::state::CrawlOutcome;
use crate::storage::{RunStatus, TrademarkRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence sink of the crawl protocol
///
/// The sequencer only ever writes through this trait, so a crawl can run
/// against SQLite, a shared handle, or an in-memory recorder in tests.
pub trait Persistence: Send {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run as finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Inserts a record or replaces the stored one with the same code
    ///
    /// # Returns
    ///
    /// The row ID of the record
    fn upsert_record(&mut self, record: &TrademarkRecord) -> StorageResult<i64>;

    /// Gets a stored record by its code
    fn get_record(&self, code: &str) -> StorageResult<Option<TrademarkRecord>>;

    /// Gets every stored record whose status equals `status`
    fn records_with_status(&self, status: &str) -> StorageResult<Vec<TrademarkRecord>>;

    /// Highest sequence stored for a prefix and year
    fn last_sequence(&self, prefix: &str, year: i32) -> StorageResult<Option<u32>>;

    // ===== History and Audit =====

    /// Appends a status observation for a stored record
    fn append_status_history(
        &mut self,
        record_id: i64,
        status: &str,
        notes: Option<&str>,
    ) -> StorageResult<()>;

    /// Appends one per-attempt audit row
    fn append_crawl_log(&mut self, outcome: &CrawlOutcome) -> StorageResult<()>;
}
