//! Sitemap and sitemap-index resolution.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info};

use loyaltyscout_fetcher::FetchScheduler;
use loyaltyscout_shared::{ErrorKind, LoyaltyScoutError, Result, RunErrorLedger, Stage};

use crate::normalize::UrlNormalizer;

/// Well-known sitemap locations, tried in order.
const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// `<loc>` entries from one sitemap document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Page URLs from `<url><loc>`.
    pub pages: Vec<String>,
    /// Sub-sitemap URLs from `<sitemap><loc>` (index files).
    pub sitemaps: Vec<String>,
}

impl SitemapDocument {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.sitemaps.is_empty()
    }
}

/// Parse a `urlset` or `sitemapindex` document.
///
/// Namespaced tags are matched on their local name; CDATA `<loc>` values are
/// accepted.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut doc = SitemapDocument::default();

    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut loc = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => in_url = true,
                b"sitemap" => in_sitemap = true,
                b"loc" => {
                    in_loc = true;
                    loc.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" => in_url = false,
                b"sitemap" => in_sitemap = false,
                b"loc" => {
                    in_loc = false;
                    let value = loc.trim();
                    if !value.is_empty() {
                        if in_url {
                            doc.pages.push(value.to_string());
                        } else if in_sitemap {
                            doc.sitemaps.push(value.to_string());
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|e| LoyaltyScoutError::parse(format!("sitemap text: {e}")))?;
                loc.push_str(&text);
            }
            Ok(Event::CData(e)) if in_loc => {
                loc.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoyaltyScoutError::parse(format!(
                    "sitemap XML error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

/// Fetches a domain's sitemap (following one level of index) through the
/// fetch scheduler.
pub struct SitemapResolver<'a> {
    scheduler: &'a FetchScheduler,
    max_sub_sitemaps: usize,
}

impl<'a> SitemapResolver<'a> {
    pub fn new(scheduler: &'a FetchScheduler, max_sub_sitemaps: usize) -> Self {
        Self {
            scheduler,
            max_sub_sitemaps,
        }
    }

    /// Fetch and parse one sitemap URL. Fetch and parse failures both become
    /// errors here; [`resolve`](Self::resolve) turns them into ledger entries.
    async fn load(&self, url: &str) -> Result<SitemapDocument> {
        let outcome = self.scheduler.fetch_one(url).await;
        let body = match outcome.text() {
            Some(body) if outcome.status.is_ok() => body,
            _ => {
                return Err(LoyaltyScoutError::FetchTerminalFailure {
                    url: url.to_string(),
                    reason: outcome.status.describe(),
                });
            }
        };
        parse_sitemap(&body)
    }

    /// All page URLs listed in the domain's sitemap(s). Never fails: problems
    /// are recorded in `ledger` and yield an empty list.
    pub async fn resolve(&self, normalizer: &UrlNormalizer, ledger: &RunErrorLedger) -> Vec<String> {
        let mut root = None;
        let mut last_error = None;

        for path in SITEMAP_PATHS {
            let url = match normalizer.normalize(path) {
                Ok(url) => url,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            match self.load(url.as_str()).await {
                Ok(doc) if !doc.is_empty() => {
                    debug!(%url, pages = doc.pages.len(), sitemaps = doc.sitemaps.len(), "sitemap found");
                    root = Some(doc);
                    break;
                }
                Ok(_) => debug!(%url, "sitemap empty"),
                Err(e) => {
                    debug!(%url, error = %e, "sitemap unavailable");
                    last_error = Some(e);
                }
            }
        }

        let Some(root) = root else {
            if let Some(e) = last_error {
                ledger.record_error(Stage::Discovery, normalizer.base_url().as_str(), &e);
            }
            return Vec::new();
        };

        let mut pages = root.pages;
        let mut seen = HashSet::new();
        let subs: Vec<String> = root
            .sitemaps
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .take(self.max_sub_sitemaps)
            .collect();

        for sub in &subs {
            if normalizer.normalize(sub).is_err() {
                debug!(%sub, "skipping off-domain sub-sitemap");
                continue;
            }
            match self.load(sub).await {
                // Nested indexes below the first level are ignored.
                Ok(doc) => pages.extend(doc.pages),
                Err(e) => {
                    ledger.record(Stage::Discovery, ErrorKind::from(&e), sub, e.to_string());
                }
            }
        }

        info!(pages = pages.len(), sub_sitemaps = subs.len(), "sitemap resolved");
        pages
    }
}
