use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use crate::collect::DedupReport;
use crate::parser::events::{ManualReview, SourceDiagnostics};
use crate::sources::Source;

#[derive(Debug, Clone, Serialize)]
pub struct FailedSource {
    pub org: String,
    pub group: String,
    pub source_url: String,
    pub status: Option<u16>,
    pub error: String,
}

/// Fetch facts plus extraction counters for one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub source: String,
    pub source_url: String,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub bytes: Option<usize>,
    pub latency_ms: Option<i64>,
    #[serde(flatten)]
    pub diagnostics: SourceDiagnostics,
    pub duplicates_removed: usize,
}

/// Run-wide diagnostics, written once when the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub run_started: String,
    pub run_finished: Option<String>,
    pub today: NaiveDate,
    pub days_ahead: u32,
    pub sources_total: usize,
    pub sources_ok: usize,
    pub sources_failed: Vec<FailedSource>,
    pub needs_manual_review: Vec<ManualReview>,
    pub sources: Vec<SourceRecord>,
    pub events_extracted: usize,
    pub duplicates_removed: usize,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl RunLog {
    pub fn new(today: NaiveDate, days_ahead: u32, sources_total: usize) -> Self {
        Self {
            run_started: now_rfc3339(),
            run_finished: None,
            today,
            days_ahead,
            sources_total,
            sources_ok: 0,
            sources_failed: Vec::new(),
            needs_manual_review: Vec::new(),
            sources: Vec::new(),
            events_extracted: 0,
            duplicates_removed: 0,
        }
    }

    pub fn record_failure(&mut self, source: &Source, status: Option<u16>, error: &str) {
        self.sources_failed.push(FailedSource {
            org: source.org.clone(),
            group: source.group.clone(),
            source_url: source.url.clone(),
            status,
            error: error.to_string(),
        });
    }

    pub fn record_source(&mut self, record: SourceRecord, review: Option<ManualReview>) {
        self.sources_ok += 1;
        self.sources.push(record);
        if let Some(review) = review {
            self.needs_manual_review.push(review);
        }
    }

    /// Close the log with the post-processed totals.
    pub fn finish(&mut self, events_extracted: usize, dedup: &DedupReport) {
        self.events_extracted = events_extracted;
        self.duplicates_removed = dedup.removed;
        for record in &mut self.sources {
            record.duplicates_removed = dedup.by_source.get(&record.source_url).copied().unwrap_or(0);
        }
        self.run_finished = Some(now_rfc3339());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
