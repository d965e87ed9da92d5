use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attempts (
            id          INTEGER PRIMARY KEY,
            file_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            version     TEXT,
            outcome     TEXT NOT NULL CHECK(outcome IN ('ok','skipped','changed','error')),
            error       TEXT,
            latency_ms  INTEGER,
            attempted_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_attempts_file ON attempts(file_id);
        CREATE INDEX IF NOT EXISTS idx_attempts_outcome ON attempts(outcome);
        ",
    )?;
    Ok(())
}

// ── Attempts ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Parsed and published.
    Ok,
    /// Not eligible yet (too new or still being edited).
    Skipped,
    /// Version moved during extraction; result discarded.
    Changed,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Skipped => "skipped",
            Outcome::Changed => "changed",
            Outcome::Error => "error",
        }
    }
}

pub struct AttemptRow {
    pub file_id: String,
    pub name: String,
    pub version: Option<String>,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn record_attempt(conn: &Connection, row: &AttemptRow) -> Result<()> {
    conn.execute(
        "INSERT INTO attempts (file_id, name, version, outcome, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            row.file_id,
            row.name,
            row.version,
            row.outcome.as_str(),
            row.error,
            row.latency_ms,
        ],
    )?;
    Ok(())
}

pub fn record_attempts(conn: &Connection, rows: &[AttemptRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for row in rows {
        record_attempt(&tx, row)?;
    }
    tx.commit()?;
    Ok(())
}

// ── Stats ──

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: i64,
    pub documents: i64,
    pub ok: i64,
    pub skipped: i64,
    pub changed: i64,
    pub errors: i64,
    pub last_attempt: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COUNT(DISTINCT file_id),
            COALESCE(SUM(outcome = 'ok'), 0),
            COALESCE(SUM(outcome = 'skipped'), 0),
            COALESCE(SUM(outcome = 'changed'), 0),
            COALESCE(SUM(outcome = 'error'), 0),
            MAX(attempted_at)
         FROM attempts",
        [],
        |row| {
            Ok(Stats {
                total: row.get(0)?,
                documents: row.get(1)?,
                ok: row.get(2)?,
                skipped: row.get(3)?,
                changed: row.get(4)?,
                errors: row.get(5)?,
                last_attempt: row.get(6)?,
            })
        },
    )?;
    Ok(stats)
}

/// Most recent failures, newest first.
pub fn recent_errors(conn: &Connection, limit: usize) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, file_id, COALESCE(error, '')
         FROM attempts WHERE outcome = 'error'
         ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
