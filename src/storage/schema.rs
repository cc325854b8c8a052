//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per application code
CREATE TABLE IF NOT EXISTS trademarks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    prefix TEXT NOT NULL,
    year INTEGER NOT NULL,
    sequence INTEGER NOT NULL,
    mark_name TEXT,
    mark_image TEXT,
    filing_date TEXT,
    publication_date TEXT,
    registration_number TEXT,
    registration_date TEXT,
    applicant_name TEXT,
    applicant_address TEXT,
    nice_classes TEXT NOT NULL DEFAULT '[]',
    nice_description TEXT,
    status TEXT,
    raw_payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trademarks_year_seq ON trademarks(prefix, year, sequence);
CREATE INDEX IF NOT EXISTS idx_trademarks_status ON trademarks(status);

-- Status observations per record
CREATE TABLE IF NOT EXISTS trademark_status_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trademark_id INTEGER NOT NULL REFERENCES trademarks(id),
    status TEXT NOT NULL,
    notes TEXT,
    observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_status_history_trademark ON trademark_status_history(trademark_id);

-- Per-attempt audit trail
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    phase TEXT NOT NULL,
    result TEXT NOT NULL,
    detail TEXT,
    proxy TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_logs_code ON crawl_logs(code);

-- Dynamic proxy registry
CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    username TEXT NOT NULL DEFAULT '',
    password TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    request_count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_proxies_endpoint ON proxies(host, port);

-- Registry session cookies, the newest active row wins
CREATE TABLE IF NOT EXISTS cookies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    psusr TEXT NOT NULL,
    jsessionid TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    expires_at TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
