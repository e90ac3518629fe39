use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use url::Url;

use super::blocks::{clean_ws, ContentBlock, Hyperlink};
use super::{datetime, geo};
use crate::model::Event;
use crate::sources::Source;

/// Blocks shorter than this (after whitespace collapse) cannot hold an event.
pub const MIN_BLOCK_CHARS: usize = 30;
pub const MIN_TITLE_CHARS: usize = 4;
const FALLBACK_TITLE_WORDS: usize = 12;

const REGISTRATION_KEYWORDS: &[&str] = &[
    "register",
    "registration",
    "rsvp",
    "details",
    "learn more",
    "tickets",
];

/// Time frame the builder evaluates blocks against.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext {
    pub today: NaiveDate,
    pub days_ahead: u32,
}

impl ExtractContext {
    pub fn new(today: NaiveDate, days_ahead: u32) -> Self {
        Self { today, days_ahead }
    }

    pub fn window_end(&self) -> NaiveDate {
        self.today
            .checked_add_days(Days::new(self.days_ahead.into()))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn in_window(&self, date: NaiveDate) -> bool {
        date >= self.today && date <= self.window_end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    NoDate,
    OutOfWindow,
    NoTitle,
    VirtualWithoutMetro,
    NotTargetMetro,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::TooShort => "too_short",
            DropReason::NoDate => "no_date",
            DropReason::OutOfWindow => "out_of_window",
            DropReason::NoTitle => "no_title",
            DropReason::VirtualWithoutMetro => "virtual_without_metro",
            DropReason::NotTargetMetro => "not_target_metro",
        }
    }
}

/// Per-source extraction counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceDiagnostics {
    pub candidates_total: usize,
    pub dated_blocks: usize,
    pub events_kept: usize,
    pub drops: BTreeMap<String, usize>,
}

impl SourceDiagnostics {
    fn record_drop(&mut self, reason: DropReason) {
        *self.drops.entry(reason.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn drop_count(&self, reason: DropReason) -> usize {
        self.drops.get(reason.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualReview {
    pub source: String,
    pub source_url: String,
    pub reason: String,
    pub diagnostics: SourceDiagnostics,
}

pub const JS_HEAVY_REASON: &str =
    "Likely JS-rendered or bot-protected; consider API/headless browser.";

/// Everything one source contributed.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub events: Vec<Event>,
    pub diagnostics: SourceDiagnostics,
    pub manual_review: Option<ManualReview>,
}

/// Evaluate candidate blocks in order, keeping those that qualify as events.
pub fn build<B: ContentBlock>(
    source: &Source,
    blocks: &[B],
    ctx: &ExtractContext,
) -> SourceOutcome {
    let mut diagnostics = SourceDiagnostics {
        candidates_total: blocks.len(),
        ..Default::default()
    };
    let mut events = Vec::new();

    for block in blocks {
        match evaluate(source, block, ctx, &mut diagnostics) {
            Ok(event) => events.push(event),
            Err(reason) => diagnostics.record_drop(reason),
        }
    }
    diagnostics.events_kept = events.len();

    let manual_review = if events.is_empty() && source.needs_js_rendering() {
        Some(ManualReview {
            source: source.id(),
            source_url: source.url.clone(),
            reason: JS_HEAVY_REASON.to_string(),
            diagnostics: diagnostics.clone(),
        })
    } else {
        None
    };

    SourceOutcome {
        events,
        diagnostics,
        manual_review,
    }
}

fn evaluate<B: ContentBlock>(
    source: &Source,
    block: &B,
    ctx: &ExtractContext,
    diagnostics: &mut SourceDiagnostics,
) -> Result<Event, DropReason> {
    let text = block.get_text();
    if text.chars().count() < MIN_BLOCK_CHARS {
        return Err(DropReason::TooShort);
    }

    let date = datetime::parse_first_date(&text).ok_or(DropReason::NoDate)?;
    diagnostics.dated_blocks += 1;
    if !ctx.in_window(date) {
        return Err(DropReason::OutOfWindow);
    }

    let links = block.find_hyperlinks();
    let title = derive_title(block, &links, &text);
    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(DropReason::NoTitle);
    }

    let registration_url = pick_registration_link(&links)
        .map(|href| resolve_url(&source.url, href))
        .unwrap_or_default();

    let city = geo::classify_metro(&text).or_else(|| geo::classify_metro(&source.group));
    let city = match city {
        Some(city) => city,
        None if geo::is_virtual(&text) => return Err(DropReason::VirtualWithoutMetro),
        None => return Err(DropReason::NotTargetMetro),
    };

    Ok(Event {
        org: source.org.clone(),
        group: source.group.clone(),
        city,
        title,
        start_date: date,
        start_time: datetime::parse_first_time(&text),
        end_date: date,
        end_time: None,
        venue: String::new(),
        registration_url,
        source_url: source.url.clone(),
    })
}

/// Heading, else a meaningful link label, else the opening words.
fn derive_title<B: ContentBlock>(block: &B, links: &[Hyperlink], text: &str) -> String {
    if let Some(heading) = block.find_first_heading() {
        return heading;
    }
    if let Some(link) = links.iter().find(|l| is_title_like(&l.text)) {
        return link.text.clone();
    }
    text.split_whitespace()
        .take(FALLBACK_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_title_like(label: &str) -> bool {
    let label = clean_ws(label);
    label.chars().count() >= MIN_TITLE_CHARS && !is_call_to_action(&label)
}

/// "Register", "RSVP here", "Learn more »" and similar button labels.
fn is_call_to_action(label: &str) -> bool {
    let lower = label.to_lowercase();
    let stripped: String = lower
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = stripped.split_whitespace().collect();
    words.len() <= 3 && REGISTRATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_registration_intent(label: &str) -> bool {
    let lower = label.to_lowercase();
    REGISTRATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn pick_registration_link(links: &[Hyperlink]) -> Option<&str> {
    links
        .iter()
        .filter(|l| is_navigable(&l.href))
        .find(|l| has_registration_intent(&l.text))
        .or_else(|| links.iter().find(|l| is_navigable(&l.href)))
        .map(|l| l.href.as_str())
}

fn is_navigable(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// Resolve `href` against the page URL. Unparseable bases leave `href` as-is.
fn resolve_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metro;

    /// Markup-free block for exercising the builder directly.
    struct FakeBlock {
        text: String,
        heading: Option<String>,
        links: Vec<Hyperlink>,
    }

    impl FakeBlock {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                heading: None,
                links: Vec::new(),
            }
        }

        fn heading(mut self, h: &str) -> Self {
            self.heading = Some(h.to_string());
            self
        }

        fn link(mut self, text: &str, href: &str) -> Self {
            self.links.push(Hyperlink {
                text: text.to_string(),
                href: href.to_string(),
            });
            self
        }
    }

    impl ContentBlock for FakeBlock {
        fn get_text(&self) -> String {
            clean_ws(&self.text)
        }
        fn find_first_heading(&self) -> Option<String> {
            self.heading.clone()
        }
        fn find_hyperlinks(&self) -> Vec<Hyperlink> {
            self.links.clone()
        }
    }

    fn ctx() -> ExtractContext {
        ExtractContext::new(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 90)
    }

    fn source(group: &str, url: &str) -> Source {
        Source::new("ISSA", group, url)
    }

    fn run(blocks: Vec<FakeBlock>) -> SourceOutcome {
        build(&source("Chapter", "https://chapter.example.org/events/"), &blocks, &ctx())
    }

    #[test]
    fn keeps_a_qualifying_block() {
        let block = FakeBlock::new("Monthly chapter meeting Feb 19, 2026 6:30pm at the Dallas Galleria")
            .heading("Monthly Chapter Meeting")
            .link("Register", "/events/42");
        let out = run(vec![block]);
        assert_eq!(out.events.len(), 1);
        let ev = &out.events[0];
        assert_eq!(ev.city, Metro::Dallas);
        assert_eq!(ev.title, "Monthly Chapter Meeting");
        assert_eq!(ev.start_date_str(), "2026-02-19");
        assert_eq!(ev.start_time_str(), "18:30");
        assert_eq!(ev.end_date, ev.start_date);
        assert_eq!(ev.end_time, None);
        assert!(ev.venue.is_empty());
        assert_eq!(ev.registration_url, "https://chapter.example.org/events/42");
        assert_eq!(ev.source_url, "https://chapter.example.org/events/");
        assert_eq!(out.diagnostics.candidates_total, 1);
        assert_eq!(out.diagnostics.dated_blocks, 1);
        assert_eq!(out.diagnostics.events_kept, 1);
        assert!(out.diagnostics.drops.is_empty());
    }

    #[test]
    fn drop_reasons_are_counted() {
        let blocks = vec![
            FakeBlock::new("Too short 2026-02-10"),
            FakeBlock::new("A long enough block of text without any calendar date"),
            FakeBlock::new("Holiday party in Austin on 2026-12-20, everyone welcome"),
            FakeBlock::new("Zoom session on threat intel 2026-02-20, bring questions"),
            FakeBlock::new("Regional summit 2026-02-21 in Denver, Colorado this year"),
        ];
        let out = run(blocks);
        let d = &out.diagnostics;
        assert!(out.events.is_empty());
        assert_eq!(d.candidates_total, 5);
        assert_eq!(d.dated_blocks, 3);
        assert_eq!(d.drop_count(DropReason::TooShort), 1);
        assert_eq!(d.drop_count(DropReason::NoDate), 1);
        assert_eq!(d.drop_count(DropReason::OutOfWindow), 1);
        assert_eq!(d.drop_count(DropReason::VirtualWithoutMetro), 1);
        assert_eq!(d.drop_count(DropReason::NotTargetMetro), 1);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let c = ctx();
        assert!(c.in_window(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
        assert!(c.in_window(NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()));
        assert!(!c.in_window(NaiveDate::from_ymd_opt(2026, 5, 3).unwrap()));
        assert!(!c.in_window(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()));
    }

    #[test]
    fn group_label_resolves_city() {
        let blocks = vec![FakeBlock::new("Quarterly lunch and learn on 2026-03-05 at noon, members free")
            .heading("Lunch and Learn")];
        let out = build(&source("Alamo (San Antonio)", "https://alamo.example.org/"), &blocks, &ctx());
        assert_eq!(out.events[0].city, Metro::SanAntonio);
    }

    #[test]
    fn virtual_with_metro_is_kept() {
        let blocks = vec![FakeBlock::new("Houston chapter webinar 2026-03-05 via Zoom, open to all")
            .heading("Chapter Webinar")];
        let out = run(blocks);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].city, Metro::Houston);
    }

    #[test]
    fn title_falls_back_to_link_then_words() {
        let block = FakeBlock::new("Register Cloud Security Workshop Austin 2026-03-05 hands-on labs and pizza")
            .link("Register", "https://tickets.example.org/r")
            .link("Cloud Security Workshop", "/workshop");
        let out = run(vec![block]);
        assert_eq!(out.events[0].title, "Cloud Security Workshop");
        assert_eq!(out.events[0].registration_url, "https://tickets.example.org/r");

        let block = FakeBlock::new(
            "Austin hacker meetup 2026-03-05 one two three four five six seven eight nine",
        );
        let out = run(vec![block]);
        assert_eq!(
            out.events[0].title,
            "Austin hacker meetup 2026-03-05 one two three four five six seven eight"
        );
    }

    #[test]
    fn short_title_is_dropped() {
        let block = FakeBlock::new("Austin gathering 2026-03-05, details to follow soon").heading("Hi");
        let out = run(vec![block]);
        assert_eq!(out.diagnostics.drop_count(DropReason::NoTitle), 1);
    }

    #[test]
    fn registration_link_preference() {
        let links = vec![
            Hyperlink { text: "Home".into(), href: "/".into() },
            Hyperlink { text: "RSVP now".into(), href: "/rsvp".into() },
        ];
        assert_eq!(pick_registration_link(&links), Some("/rsvp"));

        let links = vec![
            Hyperlink { text: "".into(), href: "javascript:void(0)".into() },
            Hyperlink { text: "Venue map".into(), href: "/map".into() },
        ];
        assert_eq!(pick_registration_link(&links), Some("/map"));
        assert_eq!(pick_registration_link(&[]), None);
    }

    #[test]
    fn missing_link_is_empty_not_dropped() {
        let block = FakeBlock::new("Dallas CTF night 2026-03-05 bring a laptop and friends").heading("CTF Night");
        let out = run(vec![block]);
        assert_eq!(out.events.len(), 1);
        assert!(out.events[0].registration_url.is_empty());
    }

    #[test]
    fn relative_url_resolution() {
        assert_eq!(
            resolve_url("https://a.example.org/events/list", "detail?id=3"),
            "https://a.example.org/events/detail?id=3"
        );
        assert_eq!(
            resolve_url("https://a.example.org/events/", "//cdn.example.org/x"),
            "https://cdn.example.org/x"
        );
        assert_eq!(resolve_url("not a url", "/x"), "/x");
        assert_eq!(resolve_url("https://a.example.org/", "https://b.example.org/y"), "https://b.example.org/y");
    }

    #[test]
    fn js_heavy_source_with_no_events_needs_review() {
        let s = source("OWASP Dallas", "https://www.meetup.com/owasp-dallas/");
        let blocks = vec![FakeBlock::new("Sign in to see upcoming events for this group, thanks")];
        let out = build(&s, &blocks, &ctx());
        let review = out.manual_review.expect("flagged for review");
        assert_eq!(review.source_url, s.url);
        assert_eq!(review.reason, JS_HEAVY_REASON);
        assert_eq!(review.diagnostics.drop_count(DropReason::NoDate), 1);

        let plain = source("NTX Dallas", "https://www.ntxissa.org/upcoming");
        assert!(build(&plain, &blocks, &ctx()).manual_review.is_none());
    }

    #[test]
    fn call_to_action_labels() {
        assert!(is_call_to_action("Register"));
        assert!(is_call_to_action("Learn more »"));
        assert!(!is_call_to_action("Registration opens for BSides Austin 2026"));
        assert!(!is_call_to_action("Cloud Security Workshop"));
    }
}
