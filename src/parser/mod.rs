pub mod blocks;
pub mod datetime;
pub mod events;
pub mod geo;

use scraper::Html;

use crate::sources::Source;
use events::{ExtractContext, SourceOutcome};

/// Two-step pipeline: HTML → candidate blocks → kept events + diagnostics.
pub fn process_page(source: &Source, html: &str, ctx: &ExtractContext) -> SourceOutcome {
    let document = Html::parse_document(html);
    let candidates = blocks::extract_candidates(&document);
    events::build(source, &candidates, ctx)
}
