use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

/// Upper bound on candidates examined per page.
pub const MAX_CANDIDATES: usize = 120;

/// Common event-listing idioms, tried in order.
const PRECISE_SELECTORS: &[&str] = &[
    "article",
    "li",
    "tr",
    ".event",
    ".event-item",
    ".tribe-events-calendar-list__event",
    ".type-tribe_events",
    ".views-row",
    ".eventlist-event",
    ".em-item",
    ".ai1ec-event",
];

/// Used only when no precise selector matched anything.
const BROAD_SELECTOR: &str = "article, section, div, li, tr";

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

static PRECISE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    PRECISE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static BROAD: LazyLock<Selector> = LazyLock::new(|| Selector::parse(BROAD_SELECTOR).unwrap());
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    /// Visible text, whitespace-collapsed.
    pub text: String,
    pub href: String,
}

/// What the event builder needs from a region of markup.
pub trait ContentBlock {
    /// Visible text with internal whitespace collapsed.
    fn get_text(&self) -> String;
    fn find_first_heading(&self) -> Option<String>;
    fn find_hyperlinks(&self) -> Vec<Hyperlink>;
}

impl ContentBlock for ElementRef<'_> {
    fn get_text(&self) -> String {
        visible_text(self)
    }

    fn find_first_heading(&self) -> Option<String> {
        self.select(&HEADING)
            .map(|h| visible_text(&h))
            .find(|t| !t.is_empty())
    }

    fn find_hyperlinks(&self) -> Vec<Hyperlink> {
        self.select(&ANCHOR)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim();
                Some(Hyperlink {
                    text: visible_text(&a),
                    href: href.to_string(),
                })
            })
            .collect()
    }
}

/// Propose candidate event blocks in discovery order, at most [`MAX_CANDIDATES`].
pub fn extract_candidates(document: &Html) -> Vec<ElementRef<'_>> {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();

    for selector in PRECISE.iter() {
        for el in document.select(selector) {
            if seen.insert(el.id()) {
                blocks.push(el);
            }
        }
    }

    if blocks.is_empty() {
        blocks.extend(document.select(&BROAD));
    }

    blocks.truncate(MAX_CANDIDATES);
    blocks
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn clean_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn visible_text(el: &ElementRef) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| HIDDEN_TAGS.contains(&a.value().name()));
        if !hidden {
            parts.push(&**text);
        }
    }
    clean_ws(&parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(blocks: &[ElementRef]) -> Vec<String> {
        blocks.iter().map(|b| b.value().name().to_string()).collect()
    }

    #[test]
    fn selector_order_then_list_order() {
        let html = Html::parse_fragment(
            "<ul><li>one</li><li>two</li></ul><article>first</article><table><tr><td>row</td></tr></table>",
        );
        let blocks = extract_candidates(&html);
        assert_eq!(names(&blocks), vec!["article", "li", "li", "tr"]);
        assert_eq!(blocks[1].get_text(), "one");
        assert_eq!(blocks[2].get_text(), "two");
    }

    #[test]
    fn same_node_matched_twice_is_kept_once() {
        let html = Html::parse_fragment(
            r#"<article class="event">A</article><div class="event views-row">B</div>"#,
        );
        let blocks = extract_candidates(&html);
        assert_eq!(blocks.len(), 2);
        assert_eq!(names(&blocks), vec!["article", "div"]);
    }

    #[test]
    fn plugin_class_patterns() {
        let html = Html::parse_fragment(
            r#"<div class="tribe-events-calendar-list__event">X</div><div class="eventlist-event">Y</div>"#,
        );
        assert_eq!(extract_candidates(&html).len(), 2);
    }

    #[test]
    fn broad_fallback_only_without_precise_matches() {
        let html = Html::parse_fragment("<section><div>Event text</div></section>");
        let blocks = extract_candidates(&html);
        assert_eq!(names(&blocks), vec!["section", "div"]);

        let html = Html::parse_fragment("<section><article>Event</article></section>");
        assert_eq!(names(&extract_candidates(&html)), vec!["article"]);
    }

    #[test]
    fn capped() {
        let items: String = (0..300).map(|i| format!("<li>item {}</li>", i)).collect();
        let html = Html::parse_fragment(&format!("<ul>{}</ul>", items));
        let blocks = extract_candidates(&html);
        assert_eq!(blocks.len(), MAX_CANDIDATES);
        assert_eq!(blocks[0].get_text(), "item 0");
        assert_eq!(blocks[MAX_CANDIDATES - 1].get_text(), "item 119");
    }

    #[test]
    fn empty_document() {
        let html = Html::parse_document("");
        assert!(extract_candidates(&html).is_empty());
    }

    #[test]
    fn text_skips_scripts_and_collapses_whitespace() {
        let html = Html::parse_fragment(
            "<article>\n  <h3>Monthly\n Meeting</h3><script>var x = 1;</script>\n<p>Austin   TX</p></article>",
        );
        let blocks = extract_candidates(&html);
        assert_eq!(blocks[0].get_text(), "Monthly Meeting Austin TX");
        assert_eq!(blocks[0].find_first_heading().as_deref(), Some("Monthly Meeting"));
    }

    #[test]
    fn hyperlinks_in_order() {
        let html = Html::parse_fragment(
            r#"<article><a href="/a">First</a><a>no href</a><a href=" https://x.org/b ">Second link</a></article>"#,
        );
        let links = extract_candidates(&html)[0].find_hyperlinks();
        assert_eq!(
            links,
            vec![
                Hyperlink { text: "First".into(), href: "/a".into() },
                Hyperlink { text: "Second link".into(), href: "https://x.org/b".into() },
            ]
        );
    }

    #[test]
    fn calendar_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/chapter_calendar.html").unwrap();
        let doc = Html::parse_document(&html);
        let blocks = extract_candidates(&doc);
        assert!(blocks.iter().any(|b| b.value().name() == "article"));
        assert!(blocks.len() <= MAX_CANDIDATES);
    }
}
