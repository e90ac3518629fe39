use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::model::Event;

const PRODID: &str = "-//Texas Cyber Events Monitor//EN";
const UID_SUFFIX: &str = "@txcyberevents";
/// Content lines longer than this many octets are folded.
const MAX_LINE_OCTETS: usize = 75;

/// Stable per-event UID: 16 hex chars of SHA-256 over title, date and link.
pub fn make_uid(ev: &Event) -> String {
    let raw = format!("{}|{}|{}", ev.title, ev.start_date_str(), ev.registration_url);
    let digest = Sha256::digest(raw.as_bytes());
    format!("{}{}", &hex::encode(digest)[..16], UID_SUFFIX)
}

/// Escape TEXT values: backslash, semicolon, comma, newline.
pub fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn description(ev: &Event) -> String {
    let mut parts = vec![
        format!("{} / {}", ev.org, ev.group),
        format!("City: {}", ev.city),
        format!("Source: {}", ev.source_url),
    ];
    if !ev.registration_url.is_empty() {
        parts.push(format!("Registration: {}", ev.registration_url));
    }
    parts.join(" | ")
}

/// Fold one content line: CRLF plus a space before the octet limit, never inside a char.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / 25);
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out
}

fn dtstart(ev: &Event) -> String {
    match ev.start_time {
        Some(t) => format!(
            "DTSTART:{}T{}",
            ev.start_date.format("%Y%m%d"),
            t.format("%H%M00")
        ),
        None => format!("DTSTART;VALUE=DATE:{}", ev.start_date.format("%Y%m%d")),
    }
}

pub fn render(events: &[Event], stamp: DateTime<Utc>) -> String {
    let dtstamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        format!("PRODID:{}", PRODID),
    ];

    for ev in events {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}", make_uid(ev)));
        lines.push(format!("DTSTAMP:{}", dtstamp));
        lines.push(format!("SUMMARY:{}", escape_text(&ev.title)));
        lines.push(dtstart(ev));
        lines.push(format!("DESCRIPTION:{}", escape_text(&description(ev))));
        if !ev.venue.is_empty() {
            lines.push(format!("LOCATION:{}", escape_text(&ev.venue)));
        }
        if !ev.registration_url.is_empty() {
            lines.push(format!("URL:{}", escape_text(&ev.registration_url)));
        }
        lines.push("END:VEVENT".to_string());
    }

    lines.push("END:VCALENDAR".to_string());
    let mut out = lines
        .iter()
        .map(|l| fold_line(l))
        .collect::<Vec<_>>()
        .join("\r\n");
    out.push_str("\r\n");
    out
}

pub fn write_file(events: &[Event], path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(render(events, Utc::now()).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_event;
    use chrono::TimeZone;

    fn unfold(ics: &str) -> String {
        ics.replace("\r\n ", "")
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn uid_is_stable_and_content_derived() {
        let a = sample_event("Monthly Meeting", "2026-03-01", None);
        let uid = make_uid(&a);
        assert_eq!(uid.len(), 16 + UID_SUFFIX.len());
        assert!(uid.ends_with(UID_SUFFIX));
        assert!(uid[..16].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(uid, make_uid(&a.clone()));

        let b = sample_event("Monthly Meeting", "2026-03-02", None);
        assert_ne!(uid, make_uid(&b));
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a\\b;c,d\ne"), "a\\\\b\\;c\\,d\\ne");
    }

    #[test]
    fn all_day_and_timed_starts() {
        let untimed = sample_event("All Day Con", "2026-03-01", None);
        let timed = sample_event("Evening Talk", "2026-03-01", Some("18:30"));
        let ics = render(&[untimed, timed], stamp());
        assert!(ics.contains("DTSTART;VALUE=DATE:20260301\r\n"));
        assert!(ics.contains("DTSTART:20260301T183000\r\n"));
        assert!(ics.contains("DTSTAMP:20260131T120000Z\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn description_and_url() {
        let ev = sample_event("Talk", "2026-03-01", None);
        let ics = unfold(&render(&[ev], stamp()));
        assert!(ics.contains(
            "DESCRIPTION:ISSA / NTX Dallas | City: Dallas | Source: https://example.org/events | Registration: https://example.org/register\r\n"
        ));
        assert!(ics.contains("URL:https://example.org/register\r\n"));
        assert!(!ics.contains("LOCATION:"));

        let mut bare = sample_event("Talk", "2026-03-01", None);
        bare.registration_url.clear();
        let ics = render(&[bare], stamp());
        assert!(!ics.contains("Registration:"));
        assert!(!ics.contains("URL:"));
    }

    #[test]
    fn long_lines_are_folded() {
        let ev = sample_event("Monthly Meeting", "2026-03-01", None);
        let ics = render(&[ev], stamp());
        assert!(ics.contains("\r\n "));
        for line in ics.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "{} octets: {}", line.len(), line);
        }
        assert!(unfold(&ics).contains("| Registration: https://example.org/register\r\n"));
    }

    #[test]
    fn folding_keeps_multibyte_chars_whole() {
        let line = format!("SUMMARY:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
        assert_eq!(fold_line("SUMMARY:short"), "SUMMARY:short");
    }
}
