use std::collections::{BTreeMap, HashSet};

use chrono::NaiveTime;
use serde::Serialize;

use crate::model::Event;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupReport {
    pub removed: usize,
    /// Duplicates discarded, keyed by the source URL of the discarded copy.
    pub by_source: BTreeMap<String, usize>,
}

fn dedup_key(ev: &Event) -> (String, chrono::NaiveDate, String) {
    (
        ev.title.trim().to_lowercase(),
        ev.start_date,
        ev.registration_url.trim().to_lowercase(),
    )
}

/// Keep the first event for each (title, date, registration link) key.
pub fn dedupe(events: Vec<Event>) -> (Vec<Event>, DedupReport) {
    let mut seen = HashSet::new();
    let mut report = DedupReport::default();
    let mut out = Vec::with_capacity(events.len());

    for ev in events {
        if seen.insert(dedup_key(&ev)) {
            out.push(ev);
        } else {
            report.removed += 1;
            *report.by_source.entry(ev.source_url.clone()).or_insert(0) += 1;
        }
    }

    (out, report)
}

/// Date, then time (untimed first), then case-folded title.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_cached_key(|ev| {
        (
            ev.start_date,
            ev.start_time.unwrap_or(NaiveTime::MIN),
            ev.title.to_lowercase(),
        )
    });
}
