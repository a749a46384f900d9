//! Run summary: per-brand status and totals written to `run_summary.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loyaltyscout_discovery::Coverage;
use loyaltyscout_shared::{MergedRecord, RunId};

/// Outcome of one brand, as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandStatus {
    /// Every page fetched and extracted, and the record has content.
    Complete,
    /// The record has content but some pages were lost.
    Partial,
    /// Pages were read but none described a loyalty program.
    NoProgramFound,
    /// Every failed fetch was refused by the site (401/403/429).
    Blocked,
    Failed,
}

/// Page-level tallies for one brand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandCounts {
    pub candidates: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    /// Subset of `fetch_failed` refused by the site.
    pub blocked: usize,
    pub cancelled: usize,
    pub extracted: usize,
    pub extraction_failed: usize,
}

impl BrandCounts {
    /// Derive the brand status from the tallies and the merged record.
    pub fn status(&self, record: &MergedRecord) -> BrandStatus {
        if self.fetched == 0 {
            return if self.blocked > 0 && self.blocked == self.fetch_failed {
                BrandStatus::Blocked
            } else if self.candidates == 0 {
                BrandStatus::NoProgramFound
            } else {
                BrandStatus::Failed
            };
        }

        if record.incomplete {
            return if self.extracted == 0 {
                BrandStatus::Failed
            } else {
                BrandStatus::NoProgramFound
            };
        }

        if self.fetch_failed + self.cancelled + self.extraction_failed > 0 {
            BrandStatus::Partial
        } else {
            BrandStatus::Complete
        }
    }
}

/// One brand's line in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandResult {
    pub brand: String,
    pub domain: String,
    pub status: BrandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    pub counts: BrandCounts,
    /// Ledger entries recorded for this brand.
    pub errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BrandResult {
    /// A brand that could not be processed at all.
    pub fn failed(brand: &str, domain: &str, note: impl Into<String>, errors: usize) -> Self {
        Self {
            brand: brand.to_string(),
            domain: domain.to_string(),
            status: BrandStatus::Failed,
            coverage: None,
            counts: BrandCounts::default(),
            errors,
            note: Some(note.into()),
        }
    }
}

/// Settings the run used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub mode: String,
    pub max_urls: usize,
    pub concurrency: usize,
    pub min_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub page_source: String,
    pub classifier: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub brands: usize,
    pub complete: usize,
    pub partial: usize,
    pub no_program_found: usize,
    pub blocked: usize,
    pub failed: usize,
    pub pages_fetched: usize,
    pub pages_extracted: usize,
    pub ledger_entries: usize,
}

impl RunTotals {
    pub fn tally(brands: &[BrandResult], ledger_entries: usize) -> Self {
        let mut totals = Self {
            brands: brands.len(),
            ledger_entries,
            ..Self::default()
        };
        for b in brands {
            match b.status {
                BrandStatus::Complete => totals.complete += 1,
                BrandStatus::Partial => totals.partial += 1,
                BrandStatus::NoProgramFound => totals.no_program_found += 1,
                BrandStatus::Blocked => totals.blocked += 1,
                BrandStatus::Failed => totals.failed += 1,
            }
            totals.pages_fetched += b.counts.fetched;
            totals.pages_extracted += b.counts.extracted;
        }
        totals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// The run was cut short by Ctrl-C or the run timeout.
    pub cancelled: bool,
    pub settings: RunSettings,
    pub brands: Vec<BrandResult>,
    pub totals: RunTotals,
}

impl RunSummary {
    pub fn any_failed(&self) -> bool {
        self.totals.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use loyaltyscout_shared::LoyaltyFields;

    use super::*;

    fn record(incomplete: bool) -> MergedRecord {
        MergedRecord {
            brand: "Acme".into(),
            domain: "acme.com".into(),
            fields: LoyaltyFields::default(),
            incomplete,
            sources: Vec::new(),
            provenance: BTreeMap::new(),
        }
    }

    #[test]
    fn blocked_is_told_apart_from_no_program() {
        let blocked = BrandCounts {
            candidates: 3,
            fetch_failed: 3,
            blocked: 3,
            ..Default::default()
        };
        assert_eq!(blocked.status(&record(true)), BrandStatus::Blocked);

        let nothing_found = BrandCounts::default();
        assert_eq!(nothing_found.status(&record(true)), BrandStatus::NoProgramFound);

        let read_but_empty = BrandCounts {
            candidates: 2,
            fetched: 2,
            extracted: 2,
            ..Default::default()
        };
        assert_eq!(read_but_empty.status(&record(true)), BrandStatus::NoProgramFound);
    }

    #[test]
    fn partial_and_complete() {
        let clean = BrandCounts {
            candidates: 2,
            fetched: 2,
            extracted: 2,
            ..Default::default()
        };
        assert_eq!(clean.status(&record(false)), BrandStatus::Complete);

        let lossy = BrandCounts {
            fetch_failed: 1,
            ..clean
        };
        assert_eq!(lossy.status(&record(false)), BrandStatus::Partial);
    }

    #[test]
    fn unreachable_and_unextractable_fail() {
        let down = BrandCounts {
            candidates: 2,
            fetch_failed: 2,
            blocked: 1,
            ..Default::default()
        };
        assert_eq!(down.status(&record(true)), BrandStatus::Failed);

        let unextractable = BrandCounts {
            candidates: 1,
            fetched: 1,
            extraction_failed: 1,
            ..Default::default()
        };
        assert_eq!(unextractable.status(&record(true)), BrandStatus::Failed);
    }

    #[test]
    fn totals_tally_statuses() {
        let ok = BrandResult {
            brand: "A".into(),
            domain: "a.com".into(),
            status: BrandStatus::Complete,
            coverage: Some(Coverage::Sufficient),
            counts: BrandCounts {
                fetched: 4,
                extracted: 3,
                ..Default::default()
            },
            errors: 0,
            note: None,
        };
        let bad = BrandResult::failed("B", "b.com", "invalid domain", 1);

        let totals = RunTotals::tally(&[ok, bad], 1);
        assert_eq!(totals.brands, 2);
        assert_eq!(totals.complete, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.pages_fetched, 4);
        assert_eq!(totals.pages_extracted, 3);
    }
}
