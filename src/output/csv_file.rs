use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Event;

pub const HEADERS: [&str; 11] = [
    "org",
    "group/chapter",
    "city",
    "event_title",
    "start_date",
    "start_time",
    "end_date",
    "end_time",
    "address/venue",
    "registration_url",
    "source_url",
];

pub fn write_events<W: Write>(events: &[Event], out: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(HEADERS)?;
    for ev in events {
        let start_date = ev.start_date_str();
        let start_time = ev.start_time_str();
        let end_date = ev.end_date_str();
        let end_time = ev.end_time_str();
        w.write_record([
            ev.org.as_str(),
            ev.group.as_str(),
            ev.city.as_str(),
            ev.title.as_str(),
            start_date.as_str(),
            start_time.as_str(),
            end_date.as_str(),
            end_time.as_str(),
            ev.venue.as_str(),
            ev.registration_url.as_str(),
            ev.source_url.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_file(events: &[Event], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_events(events, file)
}
