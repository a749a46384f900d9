//! Page-type inference from URL paths.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use loyaltyscout_shared::PageType;

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("valid regex")
}

/// Checked in order; the first match wins.
static RULES: LazyLock<Vec<(PageType, Regex)>> = LazyLock::new(|| {
    vec![
        (PageType::Terms, pattern(r"\b(terms?|conditions?|legal|tos)\b")),
        (PageType::Faq, pattern(r"\b(faqs?|help|questions?)\b")),
        (PageType::Tiers, pattern(r"\b(tiers?|levels?|status)\b")),
        (PageType::Earn, pattern(r"\bearn(ing)?\b")),
        (PageType::Redeem, pattern(r"\b(redeem|redemption|catalog(ue)?)\b")),
        (
            PageType::Overview,
            pattern(r"\b(rewards?|loyalty|members?|membership|club|perks|programs?|points|vip)\b"),
        ),
    ]
});

/// Guess a page's type from its URL path when no better signal exists.
pub fn infer_page_type(url: &str) -> PageType {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_ascii_lowercase(),
        Err(_) => url.to_ascii_lowercase(),
    };
    // Underscores are word characters to the regex engine.
    let path = path.replace('_', "-");

    RULES
        .iter()
        .find(|(_, re)| re.is_match(&path))
        .map(|(page_type, _)| *page_type)
        .unwrap_or(PageType::Other)
}
