use crate::model::Metro;

const VIRTUAL_KEYWORDS: &[&str] = &["virtual", "online", "zoom", "webinar", "teams", "remote"];

/// First metro (in enumeration order) with an alias anywhere in `text`.
pub fn classify_metro(text: &str) -> Option<Metro> {
    let lower = text.to_lowercase();
    Metro::ALL
        .into_iter()
        .find(|metro| metro.aliases().iter().any(|alias| lower.contains(alias)))
}

pub fn is_virtual(text: &str) -> bool {
    let lower = text.to_lowercase();
    VIRTUAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}
