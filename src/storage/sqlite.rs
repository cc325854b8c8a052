//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `Persistence`,
//! `ProxyRegistry` and `CookieStore` traits, plus the read-only queries the
//! statistics report is built from.

use crate::proxy::{ProxyRecord, ProxyRegistry};
use crate::session::{CookieStore, SessionCredential};
use crate::state::CrawlOutcome;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Persistence, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, TrademarkRecord};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RECORD_COLUMNS: &str = "code, prefix, year, sequence, mark_name, mark_image, filing_date,
     publication_date, registration_number, registration_date, applicant_name,
     applicant_address, nice_classes, nice_description, status, raw_payload";

/// Number of rows sharing one value of a grouped column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub label: String,
    pub count: u64,
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    // ===== Registry Maintenance =====

    /// Adds a proxy to the registry
    ///
    /// # Returns
    ///
    /// The ID of the new row
    pub fn add_proxy(&mut self, proxy: &ProxyRecord) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO proxies (host, port, username, password, is_active, request_count, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                proxy.host,
                proxy.port,
                proxy.username,
                proxy.password,
                proxy.is_active,
                proxy.request_count,
                proxy.last_used_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Stores a new session and makes it the only active one
    pub fn add_session(&mut self, session: &SessionCredential) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE cookies SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            "INSERT INTO cookies (psusr, jsessionid, is_active, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.primary_token,
                session.session_id,
                session.is_active,
                session.expires_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    // ===== Runs =====

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    /// Gets the total number of stored records
    pub fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trademarks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Gets record counts grouped by status, most frequent first
    pub fn count_by_status(&self) -> StorageResult<Vec<StatusCount>> {
        self.grouped_counts(
            "SELECT COALESCE(status, 'unknown'), COUNT(*) AS n FROM trademarks
             GROUP BY 1 ORDER BY n DESC, 1",
        )
    }

    /// Gets crawl-log counts grouped by `phase/result`
    pub fn count_crawl_outcomes(&self) -> StorageResult<Vec<StatusCount>> {
        self.grouped_counts(
            "SELECT phase || '/' || result, COUNT(*) FROM crawl_logs GROUP BY 1 ORDER BY 1",
        )
    }

    /// Gets the number of active and inactive registry proxies
    pub fn proxy_health(&self) -> StorageResult<(u64, u64)> {
        let (active, inactive): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(is_active = 1), 0), COALESCE(SUM(is_active = 0), 0) FROM proxies",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((active as u64, inactive as u64))
    }

    /// Gets the highest stored sequence for every year of a prefix
    pub fn last_sequence_per_year(&self, prefix: &str) -> StorageResult<Vec<(i32, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, MAX(sequence) FROM trademarks WHERE prefix = ?1 GROUP BY year ORDER BY year",
        )?;
        let rows = stmt
            .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Gets the status history of a record, oldest first
    pub fn status_history(&self, code: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.status FROM trademark_status_history h
             JOIN trademarks t ON t.id = h.trademark_id
             WHERE t.code = ?1 ORDER BY h.id",
        )?;
        let rows = stmt
            .query_map(params![code], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    fn grouped_counts(&self, query: &str) -> StorageResult<Vec<StatusCount>> {
        let mut stmt = self.conn.prepare(query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StatusCount {
                    label: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl Persistence for SqliteStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn upsert_record(&mut self, record: &TrademarkRecord) -> StorageResult<i64> {
        let classes = serde_json::to_string(&record.nice_classes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            &format!(
                "INSERT INTO trademarks ({RECORD_COLUMNS}, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
                 ON CONFLICT(code) DO UPDATE SET
                    mark_name = excluded.mark_name,
                    mark_image = excluded.mark_image,
                    filing_date = excluded.filing_date,
                    publication_date = excluded.publication_date,
                    registration_number = excluded.registration_number,
                    registration_date = excluded.registration_date,
                    applicant_name = excluded.applicant_name,
                    applicant_address = excluded.applicant_address,
                    nice_classes = excluded.nice_classes,
                    nice_description = excluded.nice_description,
                    status = excluded.status,
                    raw_payload = excluded.raw_payload,
                    updated_at = excluded.updated_at"
            ),
            params![
                record.code,
                record.prefix,
                record.year,
                record.sequence,
                record.mark_name,
                record.mark_image,
                record.filing_date,
                record.publication_date,
                record.registration_number,
                record.registration_date,
                record.applicant_name,
                record.applicant_address,
                classes,
                record.nice_description,
                record.status,
                record.raw_payload,
                now,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM trademarks WHERE code = ?1",
            params![record.code],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_record(&self, code: &str) -> StorageResult<Option<TrademarkRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM trademarks WHERE code = ?1"),
                params![code],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn records_with_status(&self, status: &str) -> StorageResult<Vec<TrademarkRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM trademarks WHERE status = ?1 ORDER BY year, sequence"
        ))?;
        let records = stmt
            .query_map(params![status], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn last_sequence(&self, prefix: &str, year: i32) -> StorageResult<Option<u32>> {
        let max: Option<u32> = self.conn.query_row(
            "SELECT MAX(sequence) FROM trademarks WHERE prefix = ?1 AND year = ?2",
            params![prefix, year],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn append_status_history(
        &mut self,
        record_id: i64,
        status: &str,
        notes: Option<&str>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO trademark_status_history (trademark_id, status, notes, observed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![record_id, status, notes, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn append_crawl_log(&mut self, outcome: &CrawlOutcome) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_logs (code, phase, result, detail, proxy, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                outcome.code,
                outcome.phase.to_db_string(),
                outcome.result.to_db_string(),
                outcome.detail,
                outcome.proxy,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl ProxyRegistry for SqliteStorage {
    fn active_proxies(&self) -> StorageResult<Vec<ProxyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT host, port, username, password, is_active, request_count, last_used_at
             FROM proxies WHERE is_active = 1 ORDER BY id",
        )?;
        let proxies = stmt
            .query_map([], |row| {
                Ok(ProxyRecord {
                    host: row.get(0)?,
                    port: row.get(1)?,
                    username: row.get(2)?,
                    password: row.get(3)?,
                    is_active: row.get(4)?,
                    request_count: row.get(5)?,
                    last_used_at: parse_timestamp(row.get(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(proxies)
    }

    /// Updates the stored rows for this endpoint; proxies the registry does
    /// not know about (static config entries) are left out
    fn record_proxy_health(&mut self, proxy: &ProxyRecord) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE proxies SET is_active = ?1, request_count = ?2, last_used_at = ?3
             WHERE host = ?4 AND port = ?5 AND username = ?6",
            params![
                proxy.is_active,
                proxy.request_count,
                proxy.last_used_at.map(|t| t.to_rfc3339()),
                proxy.host,
                proxy.port,
                proxy.username,
            ],
        )?;
        Ok(())
    }
}

impl CookieStore for SqliteStorage {
    fn active_session(&self) -> StorageResult<Option<SessionCredential>> {
        let session = self
            .conn
            .query_row(
                "SELECT psusr, jsessionid, is_active, expires_at FROM cookies
                 WHERE is_active = 1 ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(SessionCredential {
                        primary_token: row.get(0)?,
                        session_id: row.get(1)?,
                        is_active: row.get(2)?,
                        expires_at: parse_timestamp(row.get(3)?),
                    })
                },
            )
            .optional()?;
        Ok(session)
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TrademarkRecord> {
    let classes: String = row.get(12)?;
    let nice_classes = serde_json::from_str(&classes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

    Ok(TrademarkRecord {
        code: row.get(0)?,
        prefix: row.get(1)?,
        year: row.get(2)?,
        sequence: row.get(3)?,
        mark_name: row.get(4)?,
        mark_image: row.get(5)?,
        filing_date: row.get(6)?,
        publication_date: row.get(7)?,
        registration_number: row.get(8)?,
        registration_date: row.get(9)?,
        applicant_name: row.get(10)?,
        applicant_address: row.get(11)?,
        nice_classes,
        nice_description: row.get(13)?,
        status: row.get(14)?,
        raw_payload: row.get(15)?,
    })
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}
