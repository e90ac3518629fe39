use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::{Captures, Regex};

static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})-(\d{2})-(\d{2})\b").unwrap());
static SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(20\d{2})\b").unwrap());
static MONTH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)(\.?)\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(20\d{2})\b",
    )
    .unwrap()
});
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap]m\b|[ap]\.m\.)?").unwrap()
});

const MONTHS: &[(&str, u32)] = &[
    ("jan", 1),
    ("january", 1),
    ("feb", 2),
    ("february", 2),
    ("mar", 3),
    ("march", 3),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("jun", 6),
    ("june", 6),
    ("jul", 7),
    ("july", 7),
    ("aug", 8),
    ("august", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("oct", 10),
    ("october", 10),
    ("nov", 11),
    ("november", 11),
    ("dec", 12),
    ("december", 12),
];

type DateMatcher = fn(&str) -> Option<NaiveDate>;

/// Tried in order; the first matcher that yields a date wins.
const DATE_MATCHERS: &[DateMatcher] = &[match_iso, match_slash, match_month_name];

/// Return the first recognizable calendar date in `text`.
pub fn parse_first_date(text: &str) -> Option<NaiveDate> {
    DATE_MATCHERS.iter().find_map(|matcher| matcher(text))
}

/// `2026-02-19`
fn match_iso(text: &str) -> Option<NaiveDate> {
    let caps = ISO_RE.captures(text)?;
    NaiveDate::from_ymd_opt(num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)?)
}

/// `2/19/2026`, US month-first order.
fn match_slash(text: &str) -> Option<NaiveDate> {
    let caps = SLASH_RE.captures(text)?;
    NaiveDate::from_ymd_opt(num(&caps, 3)?, num(&caps, 1)?, num(&caps, 2)?)
}

/// `Feb 19, 2026`, `February 19th 2026`, `Sept. 3, 2026`
fn match_month_name(text: &str) -> Option<NaiveDate> {
    let caps = MONTH_NAME_RE.captures(text)?;
    let month = month_number(&caps[1])?;
    NaiveDate::from_ymd_opt(num(&caps, 4)?, month, num(&caps, 3)?)
}

/// Resolve a full or abbreviated English month name. Trailing periods are ignored.
pub fn month_number(name: &str) -> Option<u32> {
    let folded = name.trim().trim_end_matches('.').to_lowercase();
    MONTHS
        .iter()
        .find(|(key, _)| *key == folded)
        .map(|(_, n)| *n)
}

fn num<T: std::str::FromStr>(caps: &Captures, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Return the first clock time in `text` as a 24-hour time.
///
/// A bare number with neither minutes nor a meridiem is not a time and is
/// skipped. The first real candidate decides: if it is out of range the
/// text has no time.
pub fn parse_first_time(text: &str) -> Option<NaiveTime> {
    let caps = TIME_RE
        .captures_iter(text)
        .find(|c| c.get(2).is_some() || c.get(3).is_some())?;

    let mut hour: u32 = num(&caps, 1)?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let meridiem = caps
        .get(3)
        .map(|m| m.as_str().to_ascii_lowercase())
        .and_then(|m| m.chars().next());

    match meridiem {
        Some('p') if hour != 12 => hour += 12,
        Some('a') if hour == 12 => hour = 0,
        None if hour > 23 => return None,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
