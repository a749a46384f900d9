//! Keyword relevance scoring for candidate URLs.

use url::Url;

/// Scores a URL by how many distinct loyalty keywords appear in its path or
/// query.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    keywords: Vec<String>,
}

impl RelevanceScorer {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let mut normalized: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            keywords: normalized,
        }
    }

    /// Number of distinct keywords matched, case-insensitive, on
    /// non-alphanumeric boundaries. Always `>= 0`.
    pub fn score(&self, url: &str) -> f64 {
        let haystack = match Url::parse(url) {
            Ok(parsed) => {
                let mut s = parsed.path().to_ascii_lowercase();
                if let Some(query) = parsed.query() {
                    s.push('?');
                    s.push_str(&query.to_ascii_lowercase());
                }
                s
            }
            Err(_) => url.to_ascii_lowercase(),
        };

        self.keywords
            .iter()
            .filter(|kw| contains_keyword(&haystack, kw))
            .count() as f64
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Whether `keyword` (or its `s`/`es` plural) occurs in `haystack` as a
/// whole token.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        if !before_ok {
            return false;
        }
        let rest = &haystack[start + keyword.len()..];
        ["", "s", "es"].iter().any(|suffix| {
            rest.strip_prefix(suffix)
                .is_some_and(|after| after.chars().next().is_none_or(|c| !c.is_ascii_alphanumeric()))
        })
    })
}
