//! Loyalty-page discovery for one brand domain.
//!
//! Three sources run concurrently: the site's sitemap, direct probes of
//! well-known loyalty paths, and a bounded crawl from the homepage. Their
//! results are merged, deduplicated on canonical URL, scored for relevance
//! and ranked. Finding nothing is a normal outcome reported through
//! [`Coverage`], never an error.

pub mod crawl;
pub mod normalize;
pub mod probe;
pub mod score;
pub mod sitemap;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use loyaltyscout_fetcher::FetchScheduler;
use loyaltyscout_shared::{DiscoveryConfig, LoyaltyScoutError, RunErrorLedger, Stage};

pub use crawl::{BoundedCrawler, CrawlHit, CrawlLimits, extract_links};
pub use normalize::{CanonicalUrl, UrlNormalizer};
pub use score::RelevanceScorer;
pub use sitemap::{SitemapDocument, SitemapResolver, parse_sitemap};

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Where a candidate URL was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Sitemap,
    Probe,
    Crawl,
}

impl DiscoverySource {
    /// Tie-break order between equal scores. Lower ranks first.
    pub fn priority(&self) -> u8 {
        match self {
            DiscoverySource::Sitemap => 0,
            DiscoverySource::Probe => 1,
            DiscoverySource::Crawl => 2,
        }
    }
}

/// A scored, deduplicated page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: CanonicalUrl,
    pub source: DiscoverySource,
    pub hop_depth: u32,
    pub score: f64,
}

/// How much discovery found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Sufficient,
    /// Fewer candidates than `min_useful_urls`.
    Sparse,
    Empty,
}

/// Raw per-source counts before dedup and filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub sitemap: usize,
    pub probe: usize,
    pub crawl: usize,
}

/// Result of discovering one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub domain: String,
    pub candidates: Vec<CandidateUrl>,
    pub counts: SourceCounts,
    pub coverage: Coverage,
}

impl DiscoveryReport {
    /// Candidate URLs in rank order.
    pub fn urls(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| c.url.as_str().to_string())
            .collect()
    }
}

/// Merge, deduplicate, filter and rank candidates from the three sources.
///
/// First occurrence wins in sitemap → probe → crawl order. The sort is
/// stable, so equal `(score, source)` keys keep their arrival order.
pub fn rank_candidates(
    sitemap: Vec<CanonicalUrl>,
    probe: Vec<CanonicalUrl>,
    crawl: Vec<CrawlHit>,
    scorer: &RelevanceScorer,
    min_score: f64,
    max_urls: usize,
) -> Vec<CandidateUrl> {
    let arrivals = sitemap
        .into_iter()
        .map(|url| (url, DiscoverySource::Sitemap, 0))
        .chain(probe.into_iter().map(|url| (url, DiscoverySource::Probe, 0)))
        .chain(
            crawl
                .into_iter()
                .map(|hit| (hit.url, DiscoverySource::Crawl, hit.hop_depth)),
        );

    let mut seen = HashSet::new();
    let mut candidates: Vec<CandidateUrl> = arrivals
        .filter(|(url, _, _)| seen.insert(url.clone()))
        .map(|(url, source, hop_depth)| {
            let score = scorer.score(url.as_str());
            CandidateUrl {
                url,
                source,
                hop_depth,
                score,
            }
        })
        .filter(|c| c.score >= min_score)
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.source.priority().cmp(&b.source.priority()))
    });
    candidates.truncate(max_urls);
    candidates
}

// ---------------------------------------------------------------------------
// Discoverer
// ---------------------------------------------------------------------------

/// Runs discovery for brand domains using a shared fetch scheduler.
pub struct Discoverer<'a> {
    config: DiscoveryConfig,
    scheduler: &'a FetchScheduler,
    scorer: RelevanceScorer,
}

impl<'a> Discoverer<'a> {
    pub fn new(config: DiscoveryConfig, scheduler: &'a FetchScheduler) -> Self {
        let scorer = RelevanceScorer::new(&config.keywords);
        Self {
            config,
            scheduler,
            scorer,
        }
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// Discover ranked loyalty-page candidates for `domain`.
    ///
    /// Never fails: problems land in `ledger` and an empty result is reported
    /// as [`Coverage::Empty`].
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn discover(&self, domain: &str, ledger: &RunErrorLedger) -> DiscoveryReport {
        let normalizer = match UrlNormalizer::for_domain(domain) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cannot discover invalid domain");
                ledger.record_error(Stage::Discovery, domain, &e);
                return self.finish(domain, Vec::new(), SourceCounts::default(), ledger);
            }
        };

        let sitemap_resolver = SitemapResolver::new(self.scheduler, self.config.max_sub_sitemaps);
        let crawler = BoundedCrawler::new(
            self.scheduler,
            &normalizer,
            &self.scorer,
            CrawlLimits {
                max_depth: self.config.crawl_depth,
                max_pages: self.config.max_crawl_pages,
                min_score: self.config.min_score,
            },
        );

        let (sitemap_raw, probed, crawled) = tokio::join!(
            sitemap_resolver.resolve(&normalizer, ledger),
            probe::probe_paths(
                self.scheduler,
                &normalizer,
                &self.config.probe_paths,
                self.config.probe_concurrency,
            ),
            crawler.crawl(),
        );

        let sitemap: Vec<CanonicalUrl> = sitemap_raw
            .iter()
            .filter_map(|raw| normalizer.normalize(raw).ok())
            .collect();

        let counts = SourceCounts {
            sitemap: sitemap.len(),
            probe: probed.len(),
            crawl: crawled.len(),
        };

        let candidates = rank_candidates(
            sitemap,
            probed,
            crawled,
            &self.scorer,
            self.config.min_score,
            self.config.max_urls,
        );

        self.finish(domain, candidates, counts, ledger)
    }

    fn finish(
        &self,
        domain: &str,
        candidates: Vec<CandidateUrl>,
        counts: SourceCounts,
        ledger: &RunErrorLedger,
    ) -> DiscoveryReport {
        let coverage = if candidates.is_empty() {
            Coverage::Empty
        } else if candidates.len() < self.config.min_useful_urls {
            Coverage::Sparse
        } else {
            Coverage::Sufficient
        };

        match coverage {
            Coverage::Empty => {
                warn!(%domain, "discovery found no candidate pages");
                ledger.record_error(
                    Stage::Discovery,
                    domain,
                    &LoyaltyScoutError::DiscoveryExhausted {
                        domain: domain.to_string(),
                    },
                );
            }
            Coverage::Sparse => {
                warn!(%domain, found = candidates.len(), "discovery coverage is sparse");
            }
            Coverage::Sufficient => {}
        }

        info!(
            %domain,
            candidates = candidates.len(),
            sitemap = counts.sitemap,
            probe = counts.probe,
            crawl = counts.crawl,
            ?coverage,
            "discovery complete"
        );

        DiscoveryReport {
            domain: domain.to_string(),
            candidates,
            counts,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use loyaltyscout_shared::{ErrorKind, FetchConfig};

    use super::*;

    fn canon(n: &UrlNormalizer, raw: &str) -> CanonicalUrl {
        n.normalize(raw).expect("normalize")
    }

    fn fast_fetch() -> FetchConfig {
        FetchConfig {
            min_delay_ms: 0,
            backoff_base_ms: 1,
            timeout_secs: 5,
            ..FetchConfig::default()
        }
    }

    fn discovery_config(keywords: &[&str], probe_paths: &[&str]) -> DiscoveryConfig {
        DiscoveryConfig {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            probe_paths: probe_paths.iter().map(|s| s.to_string()).collect(),
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn ranking_dedupes_first_source_wins() {
        let n = UrlNormalizer::for_domain("example.com").expect("normalizer");
        let scorer = RelevanceScorer::new(&["reward", "terms"]);

        let ranked = rank_candidates(
            vec![canon(&n, "/rewards")],
            vec![canon(&n, "/rewards/"), canon(&n, "/rewards/terms")],
            vec![CrawlHit {
                url: canon(&n, "/rewards/terms"),
                hop_depth: 1,
            }],
            &scorer,
            1.0,
            10,
        );

        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].url.as_str().ends_with("/rewards/terms"));
        assert_eq!(ranked[0].source, DiscoverySource::Probe);
        assert_eq!(ranked[0].score, 2.0);
        assert_eq!(ranked[1].source, DiscoverySource::Sitemap);
    }

    #[test]
    fn ties_break_on_source_priority_and_truncate() {
        let n = UrlNormalizer::for_domain("example.com").expect("normalizer");
        let scorer = RelevanceScorer::new(&["reward"]);

        let ranked = rank_candidates(
            vec![],
            vec![canon(&n, "/reward-faq")],
            vec![CrawlHit {
                url: canon(&n, "/my-rewards"),
                hop_depth: 2,
            }],
            &scorer,
            1.0,
            1,
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].source, DiscoverySource::Probe);
    }

    #[tokio::test]
    async fn sitemap_scenario_ranks_reward_pages_and_drops_about() {
        let server = MockServer::start().await;
        let base = server.uri();
        let sitemap = format!(
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>{base}/rewards</loc></url>
                <url><loc>{base}/about</loc></url>
                <url><loc>{base}/rewards/terms</loc></url>
            </urlset>"#
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
            .mount(&server)
            .await;

        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let discoverer = Discoverer::new(discovery_config(&["reward"], &[]), &scheduler);
        let ledger = RunErrorLedger::new();

        let report = discoverer.discover(&base, &ledger).await;

        let urls = report.urls();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&format!("{base}/rewards")));
        assert!(urls.contains(&format!("{base}/rewards/terms")));
        assert!(!urls.iter().any(|u| u.ends_with("/about")));
        assert_eq!(report.counts.sitemap, 3);
        assert_eq!(report.coverage, Coverage::Sparse);
        assert!(report.candidates.iter().all(|c| c.hop_depth == 0));
    }

    #[tokio::test]
    async fn sitemap_index_followed_once() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<sitemapindex>
                   <sitemap><loc>{base}/sm-loyalty.xml</loc></sitemap>
                   <sitemap><loc>{base}/sm-loyalty.xml</loc></sitemap>
                 </sitemapindex>"
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sm-loyalty.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{base}/loyalty/tiers</loc></url></urlset>"
            )))
            .expect(1)
            .mount(&server)
            .await;

        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let resolver = SitemapResolver::new(&scheduler, 10);
        let normalizer = UrlNormalizer::for_domain(&base).expect("normalizer");
        let ledger = RunErrorLedger::new();

        let pages = resolver.resolve(&normalizer, &ledger).await;

        assert_eq!(pages, vec![format!("{base}/loyalty/tiers")]);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn probe_and_crawl_contribute_candidates() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("HEAD"))
            .and(path("/rewards"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/club/perks">Perks</a><a href="/careers">Jobs</a>
                   <a href="https://elsewhere.org/rewards">Partner</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/club/perks"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/club/perks/faq">FAQ</a><a href="/">Home</a>"#,
            ))
            .mount(&server)
            .await;

        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let discoverer = Discoverer::new(
            discovery_config(&["reward", "club", "perks", "faq"], &["/rewards", "/loyalty"]),
            &scheduler,
        );
        let ledger = RunErrorLedger::new();

        let report = discoverer.discover(&base, &ledger).await;

        assert_eq!(report.counts.probe, 1);
        assert_eq!(report.counts.crawl, 2);
        let faq = report
            .candidates
            .iter()
            .find(|c| c.url.as_str().ends_with("/club/perks/faq"))
            .expect("faq page found by crawl");
        assert_eq!(faq.source, DiscoverySource::Crawl);
        assert_eq!(faq.hop_depth, 2);
        assert_eq!(report.candidates[0].score, 3.0);
        assert!(!report.urls().iter().any(|u| u.contains("careers")));
        // Missing sitemap is recorded, not fatal.
        assert!(
            ledger
                .entries()
                .iter()
                .all(|e| e.stage == Stage::Discovery)
        );
    }

    #[tokio::test]
    async fn crawl_respects_depth_and_never_revisits() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/rewards">R</a><a href="/rewards/">R again</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rewards"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/">Home</a><a href="/rewards/tiers">Tiers</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rewards/tiers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/rewards/tiers/gold">Gold</a>"#,
            ))
            .expect(0)
            .mount(&server)
            .await;

        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let normalizer = UrlNormalizer::for_domain(&base).expect("normalizer");
        let scorer = RelevanceScorer::new(&["reward"]);
        let crawler = BoundedCrawler::new(
            &scheduler,
            &normalizer,
            &scorer,
            CrawlLimits {
                max_depth: 2,
                max_pages: 50,
                min_score: 1.0,
            },
        );

        let hits = crawler.crawl().await;

        let found: Vec<(&str, u32)> = hits
            .iter()
            .map(|h| (h.url.as_str(), h.hop_depth))
            .collect();
        let rewards = format!("{base}/rewards");
        let tiers = format!("{base}/rewards/tiers");
        assert_eq!(found, vec![(rewards.as_str(), 1), (tiers.as_str(), 2)]);
        assert!(hits.iter().all(|h| h.hop_depth <= 2));
    }

    #[tokio::test]
    async fn crawl_stops_at_page_budget_before_depth() {
        let server = MockServer::start().await;
        let base = server.uri();
        // Every page fans out: the homepage to three reward pages, each of
        // those to two children.
        Mock::given(method("GET"))
            .respond_with(|req: &wiremock::Request| {
                let page = req.url.path().trim_end_matches('/').to_string();
                let body = if page.is_empty() {
                    r#"<a href="/rewards/a">A</a><a href="/rewards/b">B</a><a href="/rewards/c">C</a>"#
                        .to_string()
                } else {
                    format!(r#"<a href="{page}/x">X</a><a href="{page}/y">Y</a>"#)
                };
                ResponseTemplate::new(200).set_body_string(body)
            })
            .mount(&server)
            .await;

        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let normalizer = UrlNormalizer::for_domain(&base).expect("normalizer");
        let scorer = RelevanceScorer::new(&["reward"]);
        let crawler = BoundedCrawler::new(
            &scheduler,
            &normalizer,
            &scorer,
            CrawlLimits {
                max_depth: 3,
                max_pages: 2,
                min_score: 1.0,
            },
        );

        let hits = crawler.crawl().await;

        let requests = server.received_requests().await.expect("recording enabled");
        let gets = requests
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .count();
        assert_eq!(gets, 2);
        // Homepage plus the first reward page were expanded; nothing deeper.
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.hop_depth <= 2));
    }

    #[tokio::test]
    async fn unreachable_domain_reports_empty_coverage() {
        let server = MockServer::start().await;
        let scheduler =
            FetchScheduler::new(&fast_fetch(), CancellationToken::new()).expect("scheduler");
        let discoverer = Discoverer::new(discovery_config(&["reward"], &["/rewards"]), &scheduler);
        let ledger = RunErrorLedger::new();

        let report = discoverer.discover(&server.uri(), &ledger).await;

        assert_eq!(report.coverage, Coverage::Empty);
        assert!(report.candidates.is_empty());
        assert!(
            ledger
                .entries()
                .iter()
                .any(|e| e.kind == ErrorKind::DiscoveryExhausted)
        );
    }
}
