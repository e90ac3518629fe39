use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::collect::{self, DedupReport};
use crate::db::{self, SnapshotRow};
use crate::fetch::{FetchedPage, Fetcher};
use crate::model::Event;
use crate::output;
use crate::parser::{self, events::ExtractContext};
use crate::runlog::{RunLog, SourceRecord};
use crate::settings::Settings;
use crate::sources::Source;

/// A page ready for extraction, with the fetch facts the run log reports.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub source: Source,
    pub html: String,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub bytes: Option<usize>,
    pub latency_ms: Option<i64>,
}

impl From<FetchedPage> for PageInput {
    fn from(page: FetchedPage) -> Self {
        Self {
            source: page.source,
            html: page.html,
            final_url: Some(page.final_url),
            status: Some(page.status),
            bytes: Some(page.bytes),
            latency_ms: Some(page.latency_ms),
        }
    }
}

impl PageInput {
    pub fn from_html(source: Source, html: String) -> Self {
        Self {
            bytes: Some(html.len()),
            source,
            html,
            final_url: None,
            status: None,
            latency_ms: None,
        }
    }
}

/// Fetch every source in order, one at a time, pausing between hosts.
///
/// Failures go to the run log; every attempt is snapshotted when `conn` is set.
pub async fn fetch_all(
    fetcher: &Fetcher,
    sources: &[Source],
    settings: &Settings,
    snapshots: Option<(&Connection, i64)>,
    log: &mut RunLog,
) -> Result<Vec<PageInput>> {
    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let delay = Duration::from_millis(settings.request_delay_ms);
    let mut pages = Vec::with_capacity(sources.len());

    for (i, source) in sources.iter().enumerate() {
        pb.set_message(source.id());
        let row = match fetcher.fetch(source).await {
            Ok(page) => {
                let row = SnapshotRow {
                    source: source.clone(),
                    final_url: Some(page.final_url.clone()),
                    status: Some(page.status),
                    content_type: page.content_type.clone(),
                    bytes: Some(page.bytes),
                    html: Some(page.html.clone()),
                    error: None,
                    latency_ms: Some(page.latency_ms),
                };
                pages.push(PageInput::from(page));
                row
            }
            Err(e) => {
                warn!(source = %source.id(), url = %source.url, error = %e, "Source failed");
                log.record_failure(source, e.status(), &e.to_string());
                SnapshotRow {
                    source: source.clone(),
                    final_url: None,
                    status: e.status(),
                    content_type: None,
                    bytes: None,
                    html: None,
                    error: Some(e.to_string()),
                    latency_ms: None,
                }
            }
        };

        if let Some((conn, run_id)) = snapshots {
            db::save_snapshot(conn, run_id, &row)?;
        }
        pb.inc(1);

        if i + 1 < sources.len() {
            tokio::time::sleep(delay).await;
        }
    }

    pb.finish_and_clear();
    info!(ok = pages.len(), failed = log.sources_failed.len(), "Fetch complete");
    Ok(pages)
}

/// Split stored snapshots into replayable pages, logging failed fetches.
pub fn pages_from_snapshots(rows: Vec<SnapshotRow>, log: &mut RunLog) -> Vec<PageInput> {
    let mut pages = Vec::with_capacity(rows.len());
    for row in rows {
        match row.html {
            Some(html) => pages.push(PageInput {
                source: row.source,
                html,
                final_url: row.final_url,
                status: row.status,
                bytes: row.bytes,
                latency_ms: row.latency_ms,
            }),
            None => {
                let error = row.error.unwrap_or_else(|| "no content".to_string());
                log.record_failure(&row.source, row.status, &error);
            }
        }
    }
    pages
}

/// Date a replay is evaluated against: a pinned date, else the run's stored date.
pub fn replay_today(
    conn: &Connection,
    run_id: i64,
    pinned: Option<NaiveDate>,
    fallback: NaiveDate,
) -> Result<NaiveDate> {
    if let Some(today) = pinned {
        return Ok(today);
    }
    Ok(db::run_today(conn, run_id)?.unwrap_or(fallback))
}

pub struct Collected {
    pub events: Vec<Event>,
    pub dedup: DedupReport,
}

/// Extract all pages, merge in source order, then dedupe and sort.
///
/// Pages are evaluated in parallel; the ordered collect keeps results identical
/// to a sequential pass.
pub fn process_pages(pages: &[PageInput], ctx: &ExtractContext, log: &mut RunLog) -> Collected {
    let outcomes: Vec<_> = pages
        .par_iter()
        .map(|p| parser::process_page(&p.source, &p.html, ctx))
        .collect();

    let mut all = Vec::new();
    for (page, outcome) in pages.iter().zip(outcomes) {
        let d = &outcome.diagnostics;
        info!(
            source = %page.source.id(),
            candidates = d.candidates_total,
            dated = d.dated_blocks,
            kept = d.events_kept,
            drops = ?d.drops,
            "Extracted"
        );
        if outcome.manual_review.is_some() {
            warn!(url = %page.source.url, "Zero events from a JS-heavy source, flagged for manual review");
        }
        log.record_source(
            SourceRecord {
                source: page.source.id(),
                source_url: page.source.url.clone(),
                final_url: page.final_url.clone(),
                status: page.status,
                bytes: page.bytes,
                latency_ms: page.latency_ms,
                diagnostics: outcome.diagnostics,
                duplicates_removed: 0,
            },
            outcome.manual_review,
        );
        all.extend(outcome.events);
    }

    let (mut events, dedup) = collect::dedupe(all);
    collect::sort_events(&mut events);
    log.finish(events.len(), &dedup);

    Collected { events, dedup }
}

pub fn write_outputs(events: &[Event], settings: &Settings, log: &RunLog) -> Result<()> {
    output::csv_file::write_file(events, &settings.output_csv)?;
    output::calendar::write_file(events, &settings.output_ics)?;
    log.write(&settings.output_log)?;
    Ok(())
}

/// Persist per-source counters next to the run's snapshots.
pub fn save_run_diagnostics(conn: &Connection, run_id: i64, log: &RunLog) -> Result<()> {
    let rows: Vec<_> = log
        .sources
        .iter()
        .map(|r| (r.source_url.clone(), r.diagnostics.clone(), r.duplicates_removed))
        .collect();
    db::save_diagnostics(conn, run_id, &rows)?;
    db::finish_run(conn, run_id, log.events_extracted)?;
    Ok(())
}
