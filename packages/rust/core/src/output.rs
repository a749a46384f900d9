//! Per-run output directory writer.
//!
//! Layout:
//! ```text
//! <output>/run_<YYYYmmdd_HHMMSS>/
//! ├── discovery/<brand>_urls.json
//! ├── raw/<brand>_<page_type>_<n>.html
//! ├── pages/<brand>_<page_type>_<n>.json
//! ├── structured/<brand>.json
//! ├── combined/all_programs.json
//! ├── combined/all_programs.jsonl
//! ├── ledger.json
//! └── run_summary.json
//! ```
//!
//! Every file is written to a temp name first and then renamed into place.
//! Brands whose names reduce to the same slug get `_2`, `_3`... suffixes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use loyaltyscout_discovery::DiscoveryReport;
use loyaltyscout_extract::ParsedPage;
use loyaltyscout_fetcher::FetchOutcome;
use loyaltyscout_shared::{
    LedgerEntry, LoyaltyFields, LoyaltyScoutError, MergedRecord, PageType, Result, brand_slug,
};

use crate::summary::RunSummary;

const SUBDIRS: [&str; 5] = ["discovery", "raw", "pages", "structured", "combined"];

/// Metadata for the comment header of a raw snapshot.
#[derive(Debug, Clone)]
pub struct RawSnapshot<'a> {
    pub brand: &'a str,
    /// File-name slug claimed for the brand in this run.
    pub slug: &'a str,
    pub page_type: PageType,
    pub outcome: &'a FetchOutcome,
    /// Name of the page source (`http` or `headless`).
    pub source: &'a str,
}

/// Contents of `pages/<brand>_<page_type>_<n>.json`.
#[derive(Debug, Serialize)]
pub struct PageRecord<'a> {
    pub url: &'a str,
    pub brand: &'a str,
    pub page_type: PageType,
    pub rank: usize,
    pub fetch: &'a FetchOutcome,
    pub raw_file: Option<String>,
    pub parsed: &'a ParsedPage,
    pub fields: &'a LoyaltyFields,
}

/// Writes one run's files.
#[derive(Debug, Clone)]
pub struct RunWriter {
    root: PathBuf,
    slugs: HashSet<String>,
}

impl RunWriter {
    /// Create `run_<timestamp>` under `output_dir` with its subdirectories.
    ///
    /// A second run within the same second gets a numeric suffix.
    #[instrument(skip_all, fields(output_dir = %output_dir.display()))]
    pub fn create(output_dir: &Path, started: DateTime<Local>) -> Result<Self> {
        let stamp = started.format("run_%Y%m%d_%H%M%S").to_string();
        let mut root = output_dir.join(&stamp);
        let mut suffix = 2;
        while root.exists() {
            root = output_dir.join(format!("{stamp}_{suffix}"));
            suffix += 1;
        }

        for sub in SUBDIRS {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| LoyaltyScoutError::io(&dir, e))?;
        }

        info!(path = %root.display(), "run directory created");
        Ok(Self {
            root,
            slugs: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a file-name slug for one brand of the run. Every call returns
    /// a slug no earlier call returned.
    pub fn claim_slug(&mut self, brand: &str) -> String {
        let base = brand_slug(brand);
        let mut slug = base.clone();
        let mut suffix = 2;
        while !self.slugs.insert(slug.clone()) {
            slug = format!("{base}_{suffix}");
            suffix += 1;
        }
        slug
    }

    pub fn write_discovery(&self, slug: &str, report: &DiscoveryReport) -> Result<PathBuf> {
        let path = self
            .root
            .join("discovery")
            .join(format!("{slug}_urls.json"));
        write_json(&path, report)?;
        Ok(path)
    }

    /// Write a raw HTML snapshot prefixed with a comment header. Returns the
    /// file name relative to the run directory.
    pub fn write_raw(&self, snapshot: &RawSnapshot<'_>, n: usize) -> Result<String> {
        let body = snapshot.outcome.body.as_deref().unwrap_or_default();
        let relative = format!("raw/{}_{}_{n}.html", snapshot.slug, snapshot.page_type);

        let mut content = raw_header(snapshot, body).into_bytes();
        content.extend_from_slice(body);
        write_atomic(&self.root.join(&relative), &content)?;
        Ok(relative)
    }

    pub fn write_page(&self, slug: &str, record: &PageRecord<'_>, n: usize) -> Result<PathBuf> {
        let path = self
            .root
            .join("pages")
            .join(format!("{slug}_{}_{n}.json", record.page_type));
        write_json(&path, record)?;
        Ok(path)
    }

    pub fn write_record(&self, slug: &str, record: &MergedRecord) -> Result<PathBuf> {
        let path = self.root.join("structured").join(format!("{slug}.json"));
        write_json(&path, record)?;
        Ok(path)
    }

    /// Write `combined/all_programs.json` and its JSON Lines twin.
    pub fn write_combined(&self, records: &[MergedRecord]) -> Result<()> {
        let dir = self.root.join("combined");
        write_json(&dir.join("all_programs.json"), &records)?;

        let mut lines = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| {
                LoyaltyScoutError::validation(format!("JSON serialization failed: {e}"))
            })?;
            lines.push_str(&line);
            lines.push('\n');
        }
        write_atomic(&dir.join("all_programs.jsonl"), lines.as_bytes())
    }

    pub fn write_ledger(&self, entries: &[LedgerEntry]) -> Result<()> {
        write_json(&self.root.join("ledger.json"), &entries)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        write_json(&self.root.join("run_summary.json"), summary)
    }
}

fn raw_header(snapshot: &RawSnapshot<'_>, body: &[u8]) -> String {
    let outcome = snapshot.outcome;
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = format!("{:x}", hasher.finalize());

    // "--" is not allowed inside an HTML comment.
    let url = outcome.url.replace("--", "%2D%2D");
    format!(
        "<!--\n\
         URL: {url}\n\
         Brand: {brand}\n\
         Page Type: {page_type}\n\
         Fetched: {fetched}\n\
         Status: {status}\n\
         Attempts: {attempts}\n\
         Source: {source}\n\
         SHA-256: {hash}\n\
         -->\n",
        brand = snapshot.brand.replace("--", "- -"),
        page_type = snapshot.page_type,
        fetched = outcome.fetched_at.to_rfc3339(),
        status = outcome.status.describe(),
        attempts = outcome.attempt_count,
        source = snapshot.source,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write a JSON file (pretty-printed).
fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        LoyaltyScoutError::validation(format!("JSON serialization failed: {e}"))
    })?;
    write_atomic(path, json.as_bytes())
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| LoyaltyScoutError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LoyaltyScoutError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use loyaltyscout_fetcher::FetchStatus;

    use super::*;

    fn started() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .single()
            .expect("valid local time")
    }

    fn outcome(body: &str) -> FetchOutcome {
        FetchOutcome {
            url: "https://acme.com/rewards".into(),
            status: FetchStatus::Ok,
            body: Some(body.as_bytes().to_vec()),
            attempt_count: 2,
            elapsed_ms: 120,
            fetched_at: Utc::now(),
        }
    }

    fn record(brand: &str) -> MergedRecord {
        MergedRecord {
            brand: brand.into(),
            domain: "acme.com".into(),
            fields: LoyaltyFields {
                program_name: Some("Acme Perks".into()),
                ..Default::default()
            },
            incomplete: false,
            sources: Vec::new(),
            provenance: BTreeMap::new(),
        }
    }

    #[test]
    fn creates_timestamped_run_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let first = RunWriter::create(tmp.path(), started()).expect("create");
        let second = RunWriter::create(tmp.path(), started()).expect("create");

        assert!(first.root().ends_with("run_20250314_092653"));
        assert!(second.root().ends_with("run_20250314_092653_2"));
        for sub in SUBDIRS {
            assert!(first.root().join(sub).is_dir(), "{sub}");
        }
    }

    #[test]
    fn raw_snapshot_carries_header_and_hash() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let writer = RunWriter::create(tmp.path(), started()).expect("create");
        let fetched = outcome("<html>hi</html>");

        let relative = writer
            .write_raw(
                &RawSnapshot {
                    brand: "Acme Co",
                    slug: "acme_co",
                    page_type: PageType::Terms,
                    outcome: &fetched,
                    source: "http",
                },
                1,
            )
            .expect("write raw");

        assert_eq!(relative, "raw/acme_co_terms_1.html");
        let written = std::fs::read_to_string(writer.root().join(&relative)).expect("read");
        assert!(written.starts_with("<!--\nURL: https://acme.com/rewards\nBrand: Acme Co\n"));
        assert!(written.contains("Page Type: terms\n"));
        assert!(written.contains("Attempts: 2\n"));
        // sha256("<html>hi</html>")
        let mut hasher = Sha256::new();
        hasher.update(b"<html>hi</html>");
        assert!(written.contains(&format!("SHA-256: {:x}\n", hasher.finalize())));
        assert!(written.ends_with("-->\n<html>hi</html>"));
    }

    #[test]
    fn combined_outputs_and_no_temp_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let writer = RunWriter::create(tmp.path(), started()).expect("create");
        let records = vec![record("Acme"), record("Beta")];

        writer.write_record("acme", &records[0]).expect("structured");
        writer.write_combined(&records).expect("combined");

        let structured: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(writer.root().join("structured/acme.json")).expect("read"),
        )
        .expect("json");
        assert_eq!(structured["programName"], "Acme Perks");
        assert_eq!(structured["brand"], "Acme");

        let jsonl =
            std::fs::read_to_string(writer.root().join("combined/all_programs.jsonl")).expect("read");
        assert_eq!(jsonl.lines().count(), 2);

        let leftovers: Vec<_> = std::fs::read_dir(writer.root().join("combined"))
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn colliding_brand_slugs_get_suffixes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut writer = RunWriter::create(tmp.path(), started()).expect("create");

        let first = writer.claim_slug("Acme");
        let second = writer.claim_slug("ACME!");
        let third = writer.claim_slug("acme");
        assert_eq!(first, "acme");
        assert_eq!(second, "acme_2");
        assert_eq!(third, "acme_3");

        writer.write_record(&first, &record("Acme")).expect("first");
        writer.write_record(&second, &record("ACME!")).expect("second");
        let read_brand = |slug: &str| {
            let text = std::fs::read_to_string(
                writer.root().join("structured").join(format!("{slug}.json")),
            )
            .expect("read");
            let value: serde_json::Value = serde_json::from_str(&text).expect("json");
            value["brand"].as_str().map(str::to_string)
        };
        assert_eq!(read_brand("acme").as_deref(), Some("Acme"));
        assert_eq!(read_brand("acme_2").as_deref(), Some("ACME!"));
    }
}
