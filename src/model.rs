use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

/// Target metros, in the order the classifier tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Metro {
    Dallas,
    Austin,
    Houston,
    #[serde(rename = "San Antonio")]
    SanAntonio,
}

impl Metro {
    pub const ALL: [Metro; 4] = [Metro::Dallas, Metro::Austin, Metro::Houston, Metro::SanAntonio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metro::Dallas => "Dallas",
            Metro::Austin => "Austin",
            Metro::Houston => "Houston",
            Metro::SanAntonio => "San Antonio",
        }
    }

    /// Lowercase keywords that place a text in this metro.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Metro::Dallas => &[
                "dallas",
                "dfw",
                "fort worth",
                "north texas",
                "plano",
                "frisco",
                "irving",
                "arlington",
            ],
            Metro::Austin => &["austin", "atx", "round rock", "cedar park"],
            Metro::Houston => &["houston", "the woodlands", "sugar land", "katy"],
            Metro::SanAntonio => &["san antonio", "satx"],
        }
    }
}

impl std::fmt::Display for Metro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered event. Built once by the event builder, never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub org: String,
    pub group: String,
    pub city: Metro,
    pub title: String,
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: NaiveDate,
    pub end_time: Option<NaiveTime>,
    pub venue: String,
    pub registration_url: String,
    pub source_url: String,
}

impl Event {
    pub fn start_date_str(&self) -> String {
        self.start_date.format("%Y-%m-%d").to_string()
    }

    pub fn end_date_str(&self) -> String {
        self.end_date.format("%Y-%m-%d").to_string()
    }

    /// `HH:MM`, or empty when the listing had no clock time.
    pub fn start_time_str(&self) -> String {
        format_time(self.start_time)
    }

    pub fn end_time_str(&self) -> String {
        format_time(self.end_time)
    }
}

fn format_time(t: Option<NaiveTime>) -> String {
    t.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn sample_event(title: &str, date: &str, time: Option<&str>) -> Event {
    let start_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    Event {
        org: "ISSA".to_string(),
        group: "NTX Dallas".to_string(),
        city: Metro::Dallas,
        title: title.to_string(),
        start_date,
        start_time: time.map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap()),
        end_date: start_date,
        end_time: None,
        venue: String::new(),
        registration_url: "https://example.org/register".to_string(),
        source_url: "https://example.org/events".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metro_display_names() {
        let names: Vec<&str> = Metro::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(names, vec!["Dallas", "Austin", "Houston", "San Antonio"]);
    }

    #[test]
    fn aliases_are_lowercase() {
        for metro in Metro::ALL {
            for alias in metro.aliases() {
                assert_eq!(*alias, alias.to_lowercase());
            }
        }
    }

    #[test]
    fn time_strings() {
        let ev = sample_event("Monthly meeting", "2026-03-01", Some("09:05"));
        assert_eq!(ev.start_date_str(), "2026-03-01");
        assert_eq!(ev.start_time_str(), "09:05");
        assert_eq!(ev.end_time_str(), "");
    }
}
