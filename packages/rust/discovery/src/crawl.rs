//! Bounded, level-synchronous link crawl from the homepage.

use std::collections::HashSet;
use std::sync::LazyLock;

use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;

use loyaltyscout_fetcher::FetchScheduler;

use crate::normalize::{CanonicalUrl, UrlNormalizer};
use crate::score::RelevanceScorer;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Hrefs that never lead to a page.
const SKIPPED_PREFIXES: &[&str] = &["#", "javascript:", "mailto:", "tel:"];

/// Crawl bounds.
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    /// Maximum hops from the homepage.
    pub max_depth: u32,
    /// Maximum pages fetched.
    pub max_pages: usize,
    /// Links scoring below this are not followed.
    pub min_score: f64,
}

/// A page found by the crawl, with its hop distance from the homepage.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlHit {
    pub url: CanonicalUrl,
    pub hop_depth: u32,
}

/// Extract absolute link targets from an HTML page.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| {
            !href.is_empty()
                && !SKIPPED_PREFIXES
                    .iter()
                    .any(|p| href.to_ascii_lowercase().starts_with(p))
        })
        .filter_map(|href| page_url.join(href).ok())
        .map(String::from)
        .collect()
}

/// Breadth-first crawler confined to one brand domain.
pub struct BoundedCrawler<'a> {
    scheduler: &'a FetchScheduler,
    normalizer: &'a UrlNormalizer,
    scorer: &'a RelevanceScorer,
    limits: CrawlLimits,
    visited: Mutex<HashSet<CanonicalUrl>>,
}

impl<'a> BoundedCrawler<'a> {
    pub fn new(
        scheduler: &'a FetchScheduler,
        normalizer: &'a UrlNormalizer,
        scorer: &'a RelevanceScorer,
        limits: CrawlLimits,
    ) -> Self {
        Self {
            scheduler,
            normalizer,
            scorer,
            limits,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Check-and-mark under the visited-set lock. Returns `true` if `url`
    /// was not seen before.
    async fn mark_visited(&self, url: &CanonicalUrl) -> bool {
        self.visited.lock().await.insert(url.clone())
    }

    /// Fetch one page and return its raw links. Failures yield no links.
    async fn expand(&self, url: CanonicalUrl) -> Vec<String> {
        let outcome = self.scheduler.fetch_one(url.as_str()).await;
        let Some(body) = outcome.text().filter(|_| outcome.status.is_ok()) else {
            debug!(%url, status = %outcome.status.describe(), "crawl fetch failed");
            return Vec::new();
        };
        match Url::parse(url.as_str()) {
            Ok(page_url) => extract_links(&body, &page_url),
            Err(_) => Vec::new(),
        }
    }

    /// Run the crawl. Returns every enqueued page except the homepage, in
    /// enqueue order.
    #[instrument(skip_all, fields(domain = %self.normalizer.registrable_domain()))]
    pub async fn crawl(&self) -> Vec<CrawlHit> {
        let cancel = self.scheduler.cancel_token();
        let seed = self.normalizer.homepage();
        self.mark_visited(&seed).await;

        let mut level = vec![seed];
        let mut depth = 0u32;
        let mut fetched = 0usize;
        let mut hits = Vec::new();

        // Pages at max_depth are never fetched: none of their links could be
        // enqueued.
        while !level.is_empty() && depth < self.limits.max_depth {
            if cancel.is_cancelled() || fetched >= self.limits.max_pages {
                break;
            }
            let take = level.len().min(self.limits.max_pages - fetched);
            fetched += take;

            let link_sets: Vec<Vec<String>> = stream::iter(level.into_iter().take(take))
                .map(|url| self.expand(url))
                .buffered(self.scheduler.concurrency())
                .collect()
                .await;

            let mut next = Vec::new();
            for raw in link_sets.into_iter().flatten() {
                let Ok(url) = self.normalizer.normalize(&raw) else {
                    continue;
                };
                if self.scorer.score(url.as_str()) < self.limits.min_score {
                    continue;
                }
                if !self.mark_visited(&url).await {
                    continue;
                }
                hits.push(CrawlHit {
                    url: url.clone(),
                    hop_depth: depth + 1,
                });
                next.push(url);
            }

            debug!(depth, fetched, enqueued = next.len(), "crawl level complete");
            level = next;
            depth += 1;
        }

        info!(pages_fetched = fetched, found = hits.len(), "crawl complete");
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_links() {
        let html = r##"<html><body>
            <a href="/rewards">Rewards</a>
            <a href="terms">Terms</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="MAILTO:help@example.com">Mail</a>
            <a href="tel:+1555">Call</a>
            <a href="https://other.com/x">Other</a>
            <a>no href</a>
        </body></html>"##;
        let page = Url::parse("https://www.example.com/rewards/").expect("url");

        let links = extract_links(html, &page);
        assert_eq!(
            links,
            vec![
                "https://www.example.com/rewards",
                "https://www.example.com/rewards/terms",
                "https://other.com/x",
            ]
        );
    }
}
