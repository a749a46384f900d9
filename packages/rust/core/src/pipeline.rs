//! End-to-end harvest pipeline: brands → discover → fetch → extract → merge → run outputs.
//!
//! Brands are processed one after another; pages within a brand are fetched
//! and extracted with bounded concurrency. A failing brand is recorded and the
//! run moves on to the next one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, instrument, warn};
use url::Url;

use loyaltyscout_discovery::{Coverage, Discoverer, DiscoveryReport};
use loyaltyscout_extract::{Classifier, ExtractRequest, PageExtractor, infer_page_type};
use loyaltyscout_fetcher::{FetchOutcome, FetchScheduler, FetchStatus};
use loyaltyscout_shared::{
    AppConfig, BrandTarget, LedgerEntry, LoyaltyScoutError, ManualSeed, MergedRecord, PageType,
    Result, RunErrorLedger, RunId, Stage,
};

use crate::merge::merge_fragments;
use crate::output::{PageRecord, RawSnapshot, RunWriter};
use crate::summary::{BrandCounts, BrandResult, RunSettings, RunSummary, RunTotals};

/// Result of a harvest run.
#[derive(Debug)]
pub struct HarvestResult {
    /// The `run_<timestamp>` directory.
    pub run_dir: PathBuf,
    /// One record per brand that got as far as merging.
    pub records: Vec<MergedRecord>,
    pub summary: RunSummary,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a brand is processed.
    fn brand_started(&self, brand: &str, current: usize, total: usize);
    /// Called for each fetch outcome of a brand.
    fn page_fetched(&self, url: &str, current: usize, total: usize);
    /// Called for each fetched page after extraction.
    fn page_extracted(&self, url: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, result: &HarvestResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn brand_started(&self, _brand: &str, _current: usize, _total: usize) {}
    fn page_fetched(&self, _url: &str, _current: usize, _total: usize) {}
    fn page_extracted(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &HarvestResult) {}
}

// ---------------------------------------------------------------------------
// Brand plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PlannedPage {
    url: String,
    /// Position in the brand's page list, 0 = most relevant.
    rank: usize,
    hint: Option<PageType>,
}

#[derive(Debug, Clone)]
enum BrandPlan {
    Discover,
    Seeded(Vec<PlannedPage>),
}

#[derive(Debug, Clone)]
struct BrandJob {
    brand: String,
    domain: String,
    plan: BrandPlan,
}

/// Group manual seeds by brand, keeping first-appearance order for brands
/// and file order (as rank) for pages.
fn group_seeds(seeds: &[ManualSeed]) -> Vec<BrandJob> {
    let mut jobs: Vec<BrandJob> = Vec::new();
    let mut pages: Vec<Vec<PlannedPage>> = Vec::new();

    for seed in seeds {
        let pos = match jobs.iter().position(|j| j.brand == seed.brand) {
            Some(pos) => pos,
            None => {
                jobs.push(BrandJob {
                    brand: seed.brand.clone(),
                    domain: seed_domain(&seed.url),
                    plan: BrandPlan::Discover,
                });
                pages.push(Vec::new());
                jobs.len() - 1
            }
        };

        let brand_pages = &mut pages[pos];
        if brand_pages.iter().any(|p| p.url == seed.url) {
            continue;
        }
        let rank = brand_pages.len();
        brand_pages.push(PlannedPage {
            url: seed.url.clone(),
            rank,
            hint: seed.page_type.as_deref().map(PageType::from_label),
        });
    }

    for (job, brand_pages) in jobs.iter_mut().zip(pages) {
        job.plan = BrandPlan::Seeded(brand_pages);
    }
    jobs
}

/// Host of a seed URL without a leading `www.`.
fn seed_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        })
        .unwrap_or_else(|| url.to_string())
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Runs discovery, fetching, extraction and merging for a list of brands.
pub struct Harvester {
    config: AppConfig,
    scheduler: FetchScheduler,
    extractor: PageExtractor,
}

impl Harvester {
    /// Build a harvester whose fetches stop once `cancel` fires.
    pub fn new(
        config: AppConfig,
        classifier: Arc<dyn Classifier>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let scheduler = FetchScheduler::new(&config.fetch, cancel)?;
        Ok(Self::with_parts(config, scheduler, PageExtractor::new(classifier)))
    }

    pub fn with_parts(config: AppConfig, scheduler: FetchScheduler, extractor: PageExtractor) -> Self {
        Self {
            config,
            scheduler,
            extractor,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.scheduler.cancel_token()
    }

    /// Discover candidates for one domain without fetching or writing anything.
    pub async fn discover(&self, domain: &str) -> (DiscoveryReport, Vec<LedgerEntry>) {
        let ledger = RunErrorLedger::new();
        let discoverer = Discoverer::new(self.config.discovery.clone(), &self.scheduler);
        let report = discoverer.discover(domain, &ledger).await;
        (report, ledger.entries())
    }

    /// Discovery mode: each brand's pages come from its domain.
    pub async fn run_discovery(
        &self,
        targets: &[BrandTarget],
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestResult> {
        let jobs = targets
            .iter()
            .map(|t| BrandJob {
                brand: t.brand.clone(),
                domain: t.domain.clone(),
                plan: BrandPlan::Discover,
            })
            .collect();
        self.run("discovery", jobs, progress).await
    }

    /// Manual mode: pages come straight from the seed list, discovery is skipped.
    pub async fn run_manual(
        &self,
        seeds: &[ManualSeed],
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestResult> {
        self.run("manual", group_seeds(seeds), progress).await
    }

    #[instrument(skip_all, fields(mode = %mode, brands = jobs.len()))]
    async fn run(
        &self,
        mode: &str,
        jobs: Vec<BrandJob>,
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = RunId::new();

        info!(%run_id, mode, brands = jobs.len(), "starting harvest run");

        // --- Phase 1: Output directory ---
        progress.phase("Preparing output directory");
        let mut writer = RunWriter::create(Path::new(&self.config.output.dir), Local::now())?;
        let ledger = RunErrorLedger::new();
        let _run_timer = self.arm_run_timeout();

        // --- Phase 2: Brands ---
        let mut records = Vec::new();
        let mut brands = Vec::new();
        let total = jobs.len();

        for (i, job) in jobs.iter().enumerate() {
            progress.brand_started(&job.brand, i + 1, total);
            let brand_ledger = ledger.scoped(&job.brand);

            if self.cancel_token().is_cancelled() {
                warn!(brand = %job.brand, "run cancelled, brand skipped");
                brands.push(BrandResult::failed(
                    &job.brand,
                    &job.domain,
                    "run cancelled before brand started",
                    0,
                ));
                continue;
            }

            let slug = writer.claim_slug(&job.brand);
            match self
                .harvest_brand(job, &slug, &brand_ledger, &writer, progress)
                .await
            {
                Ok((record, result)) => {
                    records.push(record);
                    brands.push(result);
                }
                Err(e) => {
                    warn!(brand = %job.brand, error = %e, "brand failed, continuing");
                    brand_ledger.record_error(Stage::Output, &job.brand, &e);
                    let errors = ledger.entries_for(&job.brand).len();
                    brands.push(BrandResult::failed(&job.brand, &job.domain, e.to_string(), errors));
                }
            }
        }

        // --- Phase 3: Combined outputs ---
        progress.phase("Writing combined outputs");
        writer.write_combined(&records)?;
        let entries = ledger.entries();
        writer.write_ledger(&entries)?;

        let totals = RunTotals::tally(&brands, entries.len());
        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            cancelled: self.cancel_token().is_cancelled(),
            settings: self.settings(mode),
            brands,
            totals,
        };
        writer.write_summary(&summary)?;

        let result = HarvestResult {
            run_dir: writer.root().to_path_buf(),
            records,
            summary,
        };

        progress.done(&result);

        info!(
            run_id = %result.summary.run_id,
            complete = totals.complete,
            partial = totals.partial,
            no_program_found = totals.no_program_found,
            blocked = totals.blocked,
            failed = totals.failed,
            ledger_entries = totals.ledger_entries,
            elapsed_ms = result.summary.elapsed_ms,
            "harvest run complete"
        );

        Ok(result)
    }

    /// One brand from plan to merged record.
    #[instrument(skip_all, fields(brand = %job.brand, domain = %job.domain))]
    async fn harvest_brand(
        &self,
        job: &BrandJob,
        slug: &str,
        ledger: &RunErrorLedger,
        writer: &RunWriter,
        progress: &dyn ProgressReporter,
    ) -> Result<(MergedRecord, BrandResult)> {
        // --- Discovery ---
        let (pages, coverage): (Vec<PlannedPage>, Option<Coverage>) = match &job.plan {
            BrandPlan::Seeded(pages) => (pages.clone(), None),
            BrandPlan::Discover => {
                progress.phase(&format!("Discovering {}", job.domain));
                let discoverer = Discoverer::new(self.config.discovery.clone(), &self.scheduler);
                let report = discoverer.discover(&job.domain, ledger).await;
                writer.write_discovery(slug, &report)?;
                let pages = report
                    .urls()
                    .into_iter()
                    .enumerate()
                    .map(|(rank, url)| PlannedPage {
                        url,
                        rank,
                        hint: None,
                    })
                    .collect();
                (pages, Some(report.coverage))
            }
        };

        let mut counts = BrandCounts {
            candidates: pages.len(),
            ..BrandCounts::default()
        };

        // --- Fetch ---
        progress.phase(&format!("Fetching {} pages for {}", pages.len(), job.brand));
        let urls: Vec<String> = pages.iter().map(|p| p.url.clone()).collect();
        let outcomes = self.scheduler.fetch_all(&urls, ledger).await;

        for (i, outcome) in outcomes.iter().enumerate() {
            progress.page_fetched(&outcome.url, i + 1, outcomes.len());
            match &outcome.status {
                FetchStatus::Ok => counts.fetched += 1,
                FetchStatus::Cancelled => counts.cancelled += 1,
                status => {
                    counts.fetch_failed += 1;
                    if status.is_blocked() {
                        counts.blocked += 1;
                    }
                }
            }
        }

        // --- Extract ---
        progress.phase(&format!("Extracting {}", job.brand));
        let fetched: Vec<(&PlannedPage, &FetchOutcome, String)> = pages
            .iter()
            .zip(&outcomes)
            .filter(|(_, o)| o.status.is_ok())
            .filter_map(|(p, o)| o.text().map(|html| (p, o, html)))
            .collect();

        let extractions: Vec<_> = stream::iter(fetched.iter())
            .map(|(page, outcome, html)| async move {
                self.extractor
                    .extract(ExtractRequest {
                        url: &outcome.url,
                        html: html.as_str(),
                        brand: &job.brand,
                        page_type_hint: page.hint,
                        rank: page.rank,
                    })
                    .await
            })
            .buffered(self.scheduler.concurrency())
            .collect()
            .await;

        let mut fragments = Vec::new();
        let mut per_type: HashMap<PageType, usize> = HashMap::new();
        let total = fetched.len();

        for (i, (&(page, outcome, _), extraction)) in fetched.iter().zip(extractions).enumerate() {
            progress.page_extracted(&outcome.url, i + 1, total);

            let page_type = match &extraction {
                Ok(x) => x.fragment.page_type,
                Err(_) => page.hint.unwrap_or_else(|| infer_page_type(&outcome.url)),
            };
            let n = per_type.entry(page_type).or_insert(0);
            *n += 1;

            let raw_file = writer.write_raw(
                &RawSnapshot {
                    brand: &job.brand,
                    slug,
                    page_type,
                    outcome,
                    source: self.scheduler.source_name(),
                },
                *n,
            )?;

            match extraction {
                Ok(x) => {
                    counts.extracted += 1;
                    writer.write_page(
                        slug,
                        &PageRecord {
                            url: &outcome.url,
                            brand: &job.brand,
                            page_type,
                            rank: page.rank,
                            fetch: outcome,
                            raw_file: Some(raw_file),
                            parsed: &x.parsed,
                            fields: &x.fragment.fields,
                        },
                        *n,
                    )?;
                    fragments.push(x.fragment);
                }
                Err(e) => {
                    counts.extraction_failed += 1;
                    warn!(url = %outcome.url, error = %e, "extraction failed, skipping page");
                    ledger.record_error(Stage::Extraction, &outcome.url, &e);
                }
            }
        }

        // --- Merge ---
        progress.phase(&format!("Merging {}", job.brand));
        let record = merge_fragments(&job.brand, &job.domain, &fragments);
        if record.incomplete {
            ledger.record_error(
                Stage::Merge,
                &job.brand,
                &LoyaltyScoutError::MergeIncomplete {
                    brand: job.brand.clone(),
                },
            );
        }
        writer.write_record(slug, &record)?;

        let status = counts.status(&record);
        info!(
            ?status,
            candidates = counts.candidates,
            fetched = counts.fetched,
            fragments = fragments.len(),
            "brand harvested"
        );

        let result = BrandResult {
            brand: job.brand.clone(),
            domain: job.domain.clone(),
            status,
            coverage,
            counts,
            errors: ledger.entries_for(&job.brand).len(),
            note: None,
        };
        Ok((record, result))
    }

    /// Cancel the run once `run_timeout_secs` elapses. Dropping the guard
    /// disarms the timer.
    fn arm_run_timeout(&self) -> Option<DropGuard> {
        let limit = self.config.fetch.run_timeout()?;
        let cancel = self.cancel_token().clone();
        let finished = CancellationToken::new();
        let guard = finished.clone().drop_guard();

        tokio::spawn(async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    warn!(limit_secs = limit.as_secs(), "run timeout reached, cancelling");
                    cancel.cancel();
                }
            }
        });
        Some(guard)
    }

    fn settings(&self, mode: &str) -> RunSettings {
        let fetch = &self.config.fetch;
        RunSettings {
            mode: mode.to_string(),
            max_urls: self.config.discovery.max_urls,
            concurrency: self.scheduler.concurrency(),
            min_delay_ms: fetch.min_delay_ms,
            timeout_secs: fetch.timeout_secs,
            max_attempts: fetch.max_attempts,
            page_source: self.scheduler.source_name().to_string(),
            classifier: self.extractor.classifier_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use loyaltyscout_extract::Classification;
    use loyaltyscout_fetcher::{PageSource, RawResponse, TransportError};
    use loyaltyscout_shared::record::Tier;
    use loyaltyscout_shared::{DiscoveryConfig, ErrorKind, FetchConfig, LoyaltyFields};

    use super::*;
    use crate::summary::BrandStatus;

    /// Answers by URL so merge precedence can be checked end to end.
    struct UrlClassifier;

    #[async_trait]
    impl Classifier for UrlClassifier {
        async fn classify(&self, _brand: &str, url: &str, _text: &str) -> Result<Classification> {
            let (name, benefit) = if url.ends_with("/terms") {
                ("Acme Rewards Program", "Priority support")
            } else {
                ("Acme Rewards", "Free birthday drink")
            };
            let mut fields = LoyaltyFields {
                program_name: Some(name.into()),
                ..Default::default()
            };
            fields.design.tiers = vec![Tier {
                name: Some("Gold".into()),
                benefits: vec![benefit.into()],
                ..Default::default()
            }];
            Ok(Classification {
                fields,
                page_type: None,
            })
        }

        fn name(&self) -> String {
            "url-stub".into()
        }
    }

    const PAGE: &str = "<html><head><title>Acme Rewards</title></head>\
                        <body><p>Join Acme Rewards and earn a point on every purchase.</p></body></html>";

    fn config(output: &Path) -> AppConfig {
        AppConfig {
            discovery: DiscoveryConfig {
                keywords: vec!["reward".into()],
                probe_paths: Vec::new(),
                crawl_depth: 0,
                ..DiscoveryConfig::default()
            },
            fetch: FetchConfig {
                min_delay_ms: 0,
                backoff_base_ms: 1,
                timeout_secs: 5,
                ..FetchConfig::default()
            },
            output: loyaltyscout_shared::OutputConfig {
                dir: output.to_string_lossy().into_owned(),
            },
            ..AppConfig::default()
        }
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovery_run_merges_and_writes_outputs() {
        let server = MockServer::start().await;
        let base = server.uri();
        let sitemap = format!(
            r#"<urlset>
                 <url><loc>{base}/rewards</loc></url>
                 <url><loc>{base}/rewards/terms</loc></url>
                 <url><loc>{base}/rewards/gone</loc></url>
               </urlset>"#
        );
        serve(&server, "/sitemap.xml", 200, &sitemap).await;
        serve(&server, "/rewards", 200, PAGE).await;
        serve(&server, "/rewards/terms", 200, PAGE).await;
        serve(&server, "/rewards/gone", 404, "").await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let harvester = Harvester::new(
            config(tmp.path()),
            Arc::new(UrlClassifier),
            CancellationToken::new(),
        )
        .expect("harvester");

        let targets = vec![BrandTarget {
            brand: "Acme".into(),
            domain: base.clone(),
        }];
        let result = harvester
            .run_discovery(&targets, &SilentProgress)
            .await
            .expect("run");

        let brand = &result.summary.brands[0];
        assert_eq!(brand.status, BrandStatus::Partial);
        assert_eq!(brand.counts.candidates, 3);
        assert_eq!(brand.counts.fetched, 2);
        assert_eq!(brand.counts.fetch_failed, 1);
        assert_eq!(brand.counts.extracted, 2);

        let record = &result.records[0];
        assert_eq!(record.fields.program_name.as_deref(), Some("Acme Rewards Program"));
        assert_eq!(record.fields.design.tiers.len(), 1);
        assert_eq!(
            record.fields.design.tiers[0].benefits,
            vec!["Free birthday drink", "Priority support"]
        );

        let run_dir = &result.run_dir;
        assert!(run_dir.join("discovery/acme_urls.json").is_file());
        assert!(run_dir.join("structured/acme.json").is_file());
        assert!(run_dir.join("raw/acme_terms_1.html").is_file());
        assert!(run_dir.join("pages/acme_overview_1.json").is_file());
        assert!(run_dir.join("combined/all_programs.jsonl").is_file());
        assert!(run_dir.join("run_summary.json").is_file());

        let ledger: Vec<LedgerEntry> = serde_json::from_str(
            &std::fs::read_to_string(run_dir.join("ledger.json")).expect("ledger"),
        )
        .expect("ledger json");
        assert!(ledger.iter().any(|e| e.kind == ErrorKind::FetchTerminalFailure
            && e.subject.ends_with("/rewards/gone")
            && e.brand.as_deref() == Some("Acme")));
        assert!(!result.summary.any_failed());
    }

    #[tokio::test]
    async fn manual_run_reports_blocked_brand_and_keeps_going() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/blocked/rewards", 403, "denied").await;
        serve(&server, "/open/rewards", 200, PAGE).await;

        let seeds = vec![
            ManualSeed {
                brand: "Walled".into(),
                url: format!("{base}/blocked/rewards"),
                page_type: Some("overview".into()),
            },
            ManualSeed {
                brand: "Open".into(),
                url: format!("{base}/open/rewards"),
                page_type: Some("terms".into()),
            },
        ];

        let tmp = tempfile::tempdir().expect("tempdir");
        let harvester = Harvester::new(
            config(tmp.path()),
            Arc::new(UrlClassifier),
            CancellationToken::new(),
        )
        .expect("harvester");
        let result = harvester.run_manual(&seeds, &SilentProgress).await.expect("run");

        let statuses: Vec<_> = result.summary.brands.iter().map(|b| b.status).collect();
        assert_eq!(statuses, vec![BrandStatus::Blocked, BrandStatus::Complete]);
        assert!(result.summary.brands.iter().all(|b| b.coverage.is_none()));
        assert!(result.run_dir.join("raw/open_terms_1.html").is_file());
        assert!(result.records[0].incomplete);
        assert_eq!(result.summary.settings.mode, "manual");
        assert_eq!(result.summary.settings.classifier, "url-stub");
    }

    #[tokio::test]
    async fn cancelled_run_still_writes_summary() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let harvester = Harvester::new(config(tmp.path()), Arc::new(UrlClassifier), cancel)
            .expect("harvester");

        let targets = vec![BrandTarget {
            brand: "Acme".into(),
            domain: "acme.invalid".into(),
        }];
        let result = harvester
            .run_discovery(&targets, &SilentProgress)
            .await
            .expect("run");

        assert!(result.summary.cancelled);
        assert_eq!(result.summary.brands[0].status, BrandStatus::Failed);
        assert!(result.summary.any_failed());
        assert!(result.run_dir.join("run_summary.json").is_file());
        assert!(result.records.is_empty());
    }

    /// Serves [`PAGE`] for every URL without touching the network.
    struct StaticSource;

    #[async_trait]
    impl PageSource for StaticSource {
        async fn get(&self, _url: &str) -> std::result::Result<RawResponse, TransportError> {
            Ok(RawResponse {
                status: 200,
                body: PAGE.as_bytes().to_vec(),
                retry_after: None,
            })
        }

        async fn head(&self, _url: &str) -> std::result::Result<u16, TransportError> {
            Ok(200)
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    fn seed(brand: &str, url: &str) -> ManualSeed {
        ManualSeed {
            brand: brand.into(),
            url: url.into(),
            page_type: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_cancels_later_fetches_and_keeps_merged_pages() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(tmp.path());
        cfg.fetch.concurrency = 1;
        cfg.fetch.min_delay_ms = 600;
        cfg.fetch.run_timeout_secs = Some(1);

        // Gate slots at 0ms, 600ms and 1200ms; the run is cancelled at 1000ms.
        let scheduler =
            FetchScheduler::with_source(Arc::new(StaticSource), &cfg.fetch, CancellationToken::new());
        let harvester = Harvester::with_parts(
            cfg,
            scheduler,
            PageExtractor::new(Arc::new(UrlClassifier)),
        );
        let seeds = vec![
            seed("Acme", "https://acme.test/rewards"),
            seed("Acme", "https://acme.test/rewards/terms"),
            seed("Acme", "https://acme.test/rewards/faq"),
            seed("Later", "https://later.test/rewards"),
        ];

        let result = harvester.run_manual(&seeds, &SilentProgress).await.expect("run");

        assert!(result.summary.cancelled);
        let acme = &result.summary.brands[0];
        assert_eq!(acme.counts.fetched, 2);
        assert_eq!(acme.counts.cancelled, 1);
        assert_eq!(acme.counts.fetch_failed, 0);
        assert_eq!(acme.status, BrandStatus::Partial);
        assert_eq!(result.summary.brands[1].status, BrandStatus::Failed);

        assert_eq!(result.records.len(), 1);
        assert_eq!(
            result.records[0].fields.program_name.as_deref(),
            Some("Acme Rewards Program")
        );
        assert!(result.run_dir.join("structured/acme.json").is_file());

        let ledger: Vec<LedgerEntry> = serde_json::from_str(
            &std::fs::read_to_string(result.run_dir.join("ledger.json")).expect("ledger"),
        )
        .expect("ledger json");
        assert!(
            !ledger
                .iter()
                .any(|e| e.kind == ErrorKind::FetchTerminalFailure)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn brands_with_the_same_slug_keep_separate_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = config(tmp.path());
        let scheduler =
            FetchScheduler::with_source(Arc::new(StaticSource), &cfg.fetch, CancellationToken::new());
        let harvester = Harvester::with_parts(
            cfg,
            scheduler,
            PageExtractor::new(Arc::new(UrlClassifier)),
        );
        let seeds = vec![
            seed("Acme", "https://acme.test/rewards"),
            seed("ACME!", "https://acme.example/rewards"),
        ];

        let result = harvester.run_manual(&seeds, &SilentProgress).await.expect("run");

        let run_dir = &result.run_dir;
        for slug in ["acme", "acme_2"] {
            assert!(run_dir.join(format!("structured/{slug}.json")).is_file(), "{slug}");
            assert!(run_dir.join(format!("raw/{slug}_overview_1.html")).is_file(), "{slug}");
        }
        let second: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(run_dir.join("structured/acme_2.json")).expect("read"),
        )
        .expect("json");
        assert_eq!(second["brand"], "ACME!");
    }

    #[test]
    fn seeds_group_by_brand_in_file_order() {
        let seed = |brand: &str, url: &str, page_type: Option<&str>| ManualSeed {
            brand: brand.into(),
            url: url.into(),
            page_type: page_type.map(Into::into),
        };
        let jobs = group_seeds(&[
            seed("A", "https://www.a.com/rewards", None),
            seed("B", "https://b.com/loyalty", Some("terms")),
            seed("A", "https://www.a.com/rewards/faq", Some("faq")),
            seed("A", "https://www.a.com/rewards", None),
        ]);

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].domain, "a.com");
        let BrandPlan::Seeded(pages) = &jobs[0].plan else {
            panic!("manual jobs are seeded");
        };
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].rank, 1);
        assert_eq!(pages[1].hint, Some(PageType::Faq));
    }
}
