//! SQLite persistence for page renders, issued nonces, and submissions.
//!
//! Insert-only across requests: rows are written once and read back only
//! by the aggregate report, so the single connection behind a mutex is
//! the whole concurrency story.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

/// Storage-layer failures. Surfaced in the JSON failure response; the
/// submission that hit them is lost, never queued.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS page_renders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS issued_nonces (
    nonce TEXT PRIMARY KEY,
    issued_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS vitals_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_render_id INTEGER REFERENCES page_renders(id),
    lcp REAL,
    cls REAL,
    fcp REAL,
    inp REAL,
    ttfb REAL NOT NULL,
    measurement_seconds REAL,
    user_type TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    user_agent TEXT,
    created_at TEXT NOT NULL
);
";

/// One submission ready for insertion.
///
/// Only TTFB and the URL are required; the additive wire schema means
/// older clients legitimately omit the rest, which persists as NULL.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRow {
    pub page_render_id: Option<i64>,
    pub ttfb: f64,
    pub lcp: Option<f64>,
    pub cls: Option<f64>,
    pub fcp: Option<f64>,
    pub inp: Option<f64>,
    pub measurement_seconds: Option<f64>,
    pub user_type: String,
    pub url: String,
    pub user_agent: Option<String>,
}

/// One persisted submission, read back for verification.
#[derive(Debug, Clone)]
pub struct StoredSubmission {
    pub id: i64,
    pub page_render_id: Option<i64>,
    pub ttfb: f64,
    pub lcp: Option<f64>,
    pub cls: Option<f64>,
    pub fcp: Option<f64>,
    pub inp: Option<f64>,
    pub measurement_seconds: Option<f64>,
    pub user_type: String,
    pub url: String,
    pub user_agent: Option<String>,
    pub created_at: String,
}

/// Column averages over all persisted rows. `AVG()` skips NULLs, so a
/// column no submission ever carried stays `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalsAverages {
    pub samples: i64,
    pub lcp: Option<f64>,
    pub cls: Option<f64>,
    pub ttfb: Option<f64>,
    pub fcp: Option<f64>,
    pub inp: Option<f64>,
    pub measurement_seconds: Option<f64>,
}

/// SQLite-backed store behind a single connection.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory database for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a page render before the page is served, so any later
    /// submission echoing the identity finds it.
    pub fn record_render(&self, uuid: &str, path: &str) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO page_renders (uuid, path, created_at) VALUES (?1, ?2, ?3)",
            params![uuid, path, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Resolve a correlation token to its render row.
    pub fn find_render(&self, uuid: &str) -> Result<Option<i64>, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id FROM page_renders WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Request path recorded with a render row.
    pub fn render_path(&self, id: i64) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT path FROM page_renders WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Remember an issued anti-forgery nonce.
    pub fn record_nonce(&self, nonce: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO issued_nonces (nonce, issued_at) VALUES (?1, ?2)",
            params![nonce, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Whether a nonce was issued by this daemon.
    pub fn nonce_is_known(&self, nonce: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();
        let known: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM issued_nonces WHERE nonce = ?1)",
            params![nonce],
            |row| row.get(0),
        )?;
        Ok(known != 0)
    }

    /// Insert one submission row.
    pub fn insert_submission(&self, row: &SubmissionRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vitals_log
                (page_render_id, lcp, cls, fcp, inp, ttfb, measurement_seconds,
                 user_type, url, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.page_render_id,
                row.lcp,
                row.cls,
                row.fcp,
                row.inp,
                row.ttfb,
                row.measurement_seconds,
                row.user_type,
                row.url,
                row.user_agent,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recently inserted submission.
    pub fn latest_submission(&self) -> Result<Option<StoredSubmission>, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, page_render_id, ttfb, lcp, cls, fcp, inp,
                        measurement_seconds, user_type, url, user_agent, created_at
                 FROM vitals_log ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(StoredSubmission {
                        id: row.get(0)?,
                        page_render_id: row.get(1)?,
                        ttfb: row.get(2)?,
                        lcp: row.get(3)?,
                        cls: row.get(4)?,
                        fcp: row.get(5)?,
                        inp: row.get(6)?,
                        measurement_seconds: row.get(7)?,
                        user_type: row.get(8)?,
                        url: row.get(9)?,
                        user_agent: row.get(10)?,
                        created_at: row.get(11)?,
                    })
                },
            )
            .optional()?)
    }

    /// Number of persisted submissions.
    pub fn submission_count(&self) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM vitals_log", [], |row| row.get(0))?)
    }

    /// Column averages over all rows.
    pub fn averages(&self) -> Result<VitalsAverages, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*), AVG(lcp), AVG(cls), AVG(ttfb), AVG(fcp), AVG(inp),
                    AVG(measurement_seconds)
             FROM vitals_log",
            [],
            |row| {
                Ok(VitalsAverages {
                    samples: row.get(0)?,
                    lcp: row.get(1)?,
                    cls: row.get(2)?,
                    ttfb: row.get(3)?,
                    fcp: row.get(4)?,
                    inp: row.get(5)?,
                    measurement_seconds: row.get(6)?,
                })
            },
        )?)
    }
}
