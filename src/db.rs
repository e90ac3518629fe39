use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::parser::events::SourceDiagnostics;
use crate::sources::Source;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id               INTEGER PRIMARY KEY,
            started_at       TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at      TEXT,
            today            TEXT NOT NULL,
            events_extracted INTEGER
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id           INTEGER PRIMARY KEY,
            run_id       INTEGER NOT NULL REFERENCES runs(id),
            org          TEXT NOT NULL,
            group_label  TEXT NOT NULL,
            source_url   TEXT NOT NULL,
            final_url    TEXT,
            status       INTEGER,
            content_type TEXT,
            bytes        INTEGER,
            html         TEXT,
            error        TEXT,
            latency_ms   INTEGER,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_run ON snapshots(run_id);
        CREATE INDEX IF NOT EXISTS idx_snapshots_url ON snapshots(source_url);

        CREATE TABLE IF NOT EXISTS source_diagnostics (
            id                 INTEGER PRIMARY KEY,
            run_id             INTEGER NOT NULL REFERENCES runs(id),
            source_url         TEXT NOT NULL,
            candidates_total   INTEGER NOT NULL,
            dated_blocks       INTEGER NOT NULL,
            events_kept        INTEGER NOT NULL,
            duplicates_removed INTEGER NOT NULL DEFAULT 0,
            drops_json         TEXT NOT NULL,
            UNIQUE(run_id, source_url)
        );
        ",
    )?;
    Ok(())
}

pub fn start_run(conn: &Connection, today: &str) -> Result<i64> {
    conn.execute("INSERT INTO runs (today) VALUES (?1)", params![today])?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64, events_extracted: usize) -> Result<()> {
    conn.execute(
        "UPDATE runs SET finished_at = datetime('now'), events_extracted = ?2 WHERE id = ?1",
        params![run_id, events_extracted as i64],
    )?;
    Ok(())
}

/// The `today` a run was started with, if the run exists and the value parses.
pub fn run_today(conn: &Connection, run_id: i64) -> Result<Option<NaiveDate>> {
    let today: Option<String> = conn
        .query_row("SELECT today FROM runs WHERE id = ?1", params![run_id], |row| row.get(0))
        .optional()?;
    Ok(today.and_then(|t| NaiveDate::parse_from_str(&t, "%Y-%m-%d").ok()))
}

pub fn latest_run_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM runs WHERE id IN (SELECT DISTINCT run_id FROM snapshots) ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// One fetch attempt, successful (`html` set) or not (`error` set).
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub source: Source,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub bytes: Option<usize>,
    pub html: Option<String>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn save_snapshot(conn: &Connection, run_id: i64, row: &SnapshotRow) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots
            (run_id, org, group_label, source_url, final_url, status, content_type, bytes, html, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run_id,
            row.source.org,
            row.source.group,
            row.source.url,
            row.final_url,
            row.status,
            row.content_type,
            row.bytes.map(|b| b as i64),
            row.html,
            row.error,
            row.latency_ms,
        ],
    )?;
    Ok(())
}

/// Snapshots of a run in fetch order.
pub fn fetch_snapshots(conn: &Connection, run_id: i64) -> Result<Vec<SnapshotRow>> {
    let mut stmt = conn.prepare(
        "SELECT org, group_label, source_url, final_url, status, content_type, bytes, html, error, latency_ms
         FROM snapshots WHERE run_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            let org: String = row.get(0)?;
            let group: String = row.get(1)?;
            let url: String = row.get(2)?;
            Ok(SnapshotRow {
                source: Source { org, group, url },
                final_url: row.get(3)?,
                status: row.get(4)?,
                content_type: row.get(5)?,
                bytes: row.get::<_, Option<i64>>(6)?.map(|b| b as usize),
                html: row.get(7)?,
                error: row.get(8)?,
                latency_ms: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_diagnostics(
    conn: &Connection,
    run_id: i64,
    rows: &[(String, SourceDiagnostics, usize)],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO source_diagnostics
                (run_id, source_url, candidates_total, dated_blocks, events_kept, duplicates_removed, drops_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (url, diag, duplicates) in rows {
            stmt.execute(params![
                run_id,
                url,
                diag.candidates_total as i64,
                diag.dated_blocks as i64,
                diag.events_kept as i64,
                *duplicates as i64,
                serde_json::to_string(&diag.drops)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn fetch_diagnostics(conn: &Connection, run_id: i64) -> Result<Vec<(String, SourceDiagnostics)>> {
    let mut stmt = conn.prepare(
        "SELECT source_url, candidates_total, dated_blocks, events_kept, drops_json
         FROM source_diagnostics WHERE run_id = ?1 ORDER BY id",
    )?;
    let raw = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(url, total, dated, kept, drops)| -> Result<(String, SourceDiagnostics)> {
            Ok((
                url,
                SourceDiagnostics {
                    candidates_total: total as usize,
                    dated_blocks: dated as usize,
                    events_kept: kept as usize,
                    drops: serde_json::from_str(&drops)?,
                },
            ))
        })
        .collect()
}

pub struct Stats {
    pub runs: i64,
    pub snapshots: i64,
    pub failed: i64,
    pub total_bytes: i64,
    pub last_run: Option<(i64, String, Option<i64>)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let snapshots: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?;
    let failed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM snapshots WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let total_bytes: i64 = conn.query_row(
        "SELECT COALESCE(SUM(bytes), 0) FROM snapshots",
        [],
        |r| r.get(0),
    )?;
    let last_run = conn
        .query_row(
            "SELECT id, started_at, events_extracted FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    Ok(Stats {
        runs,
        snapshots,
        failed,
        total_bytes,
        last_run,
    })
}
