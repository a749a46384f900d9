//! Core domain types passed between the discovery, fetch, extract and merge stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::LoyaltyFields;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PageType
// ---------------------------------------------------------------------------

/// What kind of loyalty page a URL holds.
///
/// Closed set: anything unrecognized is [`PageType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Overview,
    Terms,
    Faq,
    Tiers,
    Earn,
    Redeem,
    Other,
}

impl PageType {
    pub const ALL: [PageType; 7] = [
        PageType::Overview,
        PageType::Terms,
        PageType::Faq,
        PageType::Tiers,
        PageType::Earn,
        PageType::Redeem,
        PageType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Overview => "overview",
            PageType::Terms => "terms",
            PageType::Faq => "faq",
            PageType::Tiers => "tiers",
            PageType::Earn => "earn",
            PageType::Redeem => "redeem",
            PageType::Other => "other",
        }
    }

    /// Scalar-field precedence during merge. Lower wins.
    ///
    /// `terms > overview > tiers > earn > redeem > faq > other`.
    pub fn precedence(&self) -> u8 {
        match self {
            PageType::Terms => 0,
            PageType::Overview => 1,
            PageType::Tiers => 2,
            PageType::Earn => 3,
            PageType::Redeem => 4,
            PageType::Faq => 5,
            PageType::Other => 6,
        }
    }

    /// Lenient parse of a label from an input file or the classifier.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "overview" | "rewards" | "loyalty" | "program" | "main" => PageType::Overview,
            "terms" | "terms-and-conditions" | "conditions" | "legal" | "tos" => PageType::Terms,
            "faq" | "faqs" | "help" => PageType::Faq,
            "tiers" | "tier" | "levels" | "level" | "status" => PageType::Tiers,
            "earn" | "earning" => PageType::Earn,
            "redeem" | "redemption" | "catalog" => PageType::Redeem,
            _ => PageType::Other,
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fragments and records
// ---------------------------------------------------------------------------

/// One page's extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFragment {
    pub source_url: String,
    pub page_type: PageType,
    /// Discovery rank, 0 = most relevant.
    pub rank: usize,
    pub fields: LoyaltyFields,
}

impl PageFragment {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            url: self.source_url.clone(),
            page_type: self.page_type,
            rank: self.rank,
        }
    }
}

/// Audit pointer back to the page a value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub page_type: PageType,
    pub rank: usize,
}

/// The reconciled record for one brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub brand: String,
    pub domain: String,
    #[serde(flatten)]
    pub fields: LoyaltyFields,
    /// No usable fragment contributed to this record.
    pub incomplete: bool,
    /// Every page folded into the record, in merge order.
    pub sources: Vec<SourceRef>,
    /// Scalar field path → page that supplied the value.
    pub provenance: BTreeMap<String, SourceRef>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One row of the discovery-mode input list (`brand,domain`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandTarget {
    pub brand: String,
    pub domain: String,
}

/// One row of the manual-mode input list (`brand,url,page_type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSeed {
    pub brand: String,
    pub url: String,
    #[serde(default)]
    pub page_type: Option<String>,
}

/// Filesystem-safe form of a brand name (`"Joe's Café"` → `"joe_s_caf"`).
pub fn brand_slug(brand: &str) -> String {
    let mut slug = String::with_capacity(brand.len());
    for c in brand.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() { "brand".into() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn precedence_is_total_and_ordered() {
        let mut ordered = PageType::ALL.to_vec();
        ordered.sort_by_key(PageType::precedence);
        assert_eq!(
            ordered,
            vec![
                PageType::Terms,
                PageType::Overview,
                PageType::Tiers,
                PageType::Earn,
                PageType::Redeem,
                PageType::Faq,
                PageType::Other,
            ]
        );
    }

    #[test]
    fn labels_parse_leniently() {
        assert_eq!(PageType::from_label("Terms and Conditions"), PageType::Terms);
        assert_eq!(PageType::from_label("FAQ"), PageType::Faq);
        assert_eq!(PageType::from_label("rewards"), PageType::Overview);
        assert_eq!(PageType::from_label(" tiers "), PageType::Tiers);
        assert_eq!(PageType::from_label("careers"), PageType::Other);
        for page_type in PageType::ALL {
            assert_eq!(PageType::from_label(page_type.as_str()), page_type);
        }
    }

    #[test]
    fn merged_record_flattens_fields() {
        let record = MergedRecord {
            brand: "Acme".into(),
            domain: "acme.com".into(),
            fields: LoyaltyFields {
                program_name: Some("Acme Perks".into()),
                ..Default::default()
            },
            incomplete: false,
            sources: Vec::new(),
            provenance: BTreeMap::new(),
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["programName"], "Acme Perks");
        assert_eq!(value["brand"], "Acme");
    }

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(brand_slug("Joe's Café"), "joe_s_caf");
        assert_eq!(brand_slug("  Best Buy "), "best_buy");
        assert_eq!(brand_slug("!!!"), "brand");
    }
}
