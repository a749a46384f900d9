//! Merge engine: per-page fragments → one record per brand.
//!
//! Fragments are folded in discovery-rank order.
//!
//! - Scalars: the value from the page type with the highest precedence
//!   (`terms > overview > tiers > earn > redeem > faq > other`) wins; within
//!   one page type the lower discovery rank wins.
//! - String lists: union, deduplicated case-insensitively.
//! - Entity lists: union keyed on the entry's name (or question). A duplicate
//!   keeps whichever entry fills more fields, the earlier one on ties. Tiers
//!   additionally take the union of both benefit lists.
//!
//! Nothing is invented: a field absent from every fragment stays absent.

use std::collections::BTreeMap;

use tracing::debug;

use loyaltyscout_shared::record::{
    AchievementBadge, CatalogProduct, Faq, GiftCard, Incentive, Segment, Tier,
};
use loyaltyscout_shared::{LoyaltyFields, MergedRecord, PageFragment, SourceRef};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build a brand's record from its page fragments.
///
/// Empty input (or input without any usable field) yields an empty record
/// flagged `incomplete`.
pub fn merge_fragments(brand: &str, domain: &str, fragments: &[PageFragment]) -> MergedRecord {
    let mut builder = RecordBuilder::new(brand, domain);
    builder.fold_all(fragments);
    builder.finish()
}

/// Fold more fragments into an existing record, producing a new one.
///
/// `remerge(&merge_fragments(b, d, fs), &[])` equals `merge_fragments(b, d, fs)`.
pub fn remerge(record: &MergedRecord, fragments: &[PageFragment]) -> MergedRecord {
    let mut builder = RecordBuilder::from_record(record);
    builder.fold_all(fragments);
    builder.finish()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct RecordBuilder {
    brand: String,
    domain: String,
    fields: LoyaltyFields,
    sources: Vec<SourceRef>,
    provenance: BTreeMap<String, SourceRef>,
}

impl RecordBuilder {
    fn new(brand: &str, domain: &str) -> Self {
        Self {
            brand: brand.to_string(),
            domain: domain.to_string(),
            fields: LoyaltyFields::default(),
            sources: Vec::new(),
            provenance: BTreeMap::new(),
        }
    }

    fn from_record(record: &MergedRecord) -> Self {
        Self {
            brand: record.brand.clone(),
            domain: record.domain.clone(),
            fields: record.fields.clone(),
            sources: record.sources.clone(),
            provenance: record.provenance.clone(),
        }
    }

    fn fold_all(&mut self, fragments: &[PageFragment]) {
        let mut ordered: Vec<&PageFragment> = fragments.iter().collect();
        ordered.sort_by_key(|f| (f.rank, f.page_type.precedence()));
        for fragment in ordered {
            self.fold(fragment);
        }
    }

    fn fold(&mut self, fragment: &PageFragment) {
        let source = fragment.source_ref();
        let incoming = &fragment.fields;

        for scalar in Scalar::ALL {
            self.fold_scalar(scalar, scalar.get(incoming), &source);
        }

        let strategy = &mut self.fields.strategy;
        union_strings(&mut strategy.goals, &incoming.strategy.goals);
        union_strings(&mut strategy.behaviors, &incoming.strategy.behaviors);
        union_strings(&mut strategy.audience, &incoming.strategy.audience);
        union_strings(&mut strategy.channels, &incoming.strategy.channels);

        let design = &mut self.fields.design;
        union_entries(&mut design.segments, &incoming.design.segments);
        union_entries(&mut design.tiers, &incoming.design.tiers);
        union_entries(&mut design.incentives, &incoming.design.incentives);

        let rewards = &mut design.rewards;
        let incoming_rewards = &incoming.design.rewards;
        union_entries(
            &mut rewards.achievement_badges,
            &incoming_rewards.achievement_badges,
        );
        union_entries(&mut rewards.gift_cards, &incoming_rewards.gift_cards);
        union_entries(
            &mut rewards.catalog_products,
            &incoming_rewards.catalog_products,
        );

        union_entries(&mut self.fields.faqs, &incoming.faqs);

        if !self.sources.iter().any(|s| s.url == source.url) {
            self.sources.push(source);
        }
    }

    fn fold_scalar(&mut self, scalar: Scalar, value: Option<&str>, source: &SourceRef) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };

        let replace = match self.provenance.get(scalar.path()) {
            None => scalar.get(&self.fields).is_none(),
            Some(current) => precedence_key(source) < precedence_key(current),
        };
        if !replace {
            return;
        }

        debug!(field = scalar.path(), url = %source.url, "scalar taken");
        *scalar.slot(&mut self.fields) = Some(value.to_string());
        self.provenance
            .insert(scalar.path().to_string(), source.clone());
    }

    fn finish(self) -> MergedRecord {
        let incomplete = self.fields.is_empty();
        MergedRecord {
            brand: self.brand,
            domain: self.domain,
            fields: self.fields,
            incomplete,
            sources: self.sources,
            provenance: self.provenance,
        }
    }
}

/// Lower wins: page-type precedence first, then discovery rank.
fn precedence_key(source: &SourceRef) -> (u8, usize) {
    (source.page_type.precedence(), source.rank)
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Scalar {
    ProgramName,
    Description,
    Eligibility,
    SignupBonus,
    Industry,
    ProgramType,
    PointsPerDollar,
}

impl Scalar {
    const ALL: [Scalar; 7] = [
        Scalar::ProgramName,
        Scalar::Description,
        Scalar::Eligibility,
        Scalar::SignupBonus,
        Scalar::Industry,
        Scalar::ProgramType,
        Scalar::PointsPerDollar,
    ];

    /// Field path as it appears in the output JSON.
    fn path(self) -> &'static str {
        match self {
            Scalar::ProgramName => "programName",
            Scalar::Description => "description",
            Scalar::Eligibility => "eligibility",
            Scalar::SignupBonus => "signupBonus",
            Scalar::Industry => "strategy.industry",
            Scalar::ProgramType => "strategy.programType",
            Scalar::PointsPerDollar => "design.rewards.loyalty_points.points_per_dollar",
        }
    }

    fn get(self, f: &LoyaltyFields) -> Option<&str> {
        match self {
            Scalar::ProgramName => f.program_name.as_deref(),
            Scalar::Description => f.description.as_deref(),
            Scalar::Eligibility => f.eligibility.as_deref(),
            Scalar::SignupBonus => f.signup_bonus.as_deref(),
            Scalar::Industry => f.strategy.industry.as_deref(),
            Scalar::ProgramType => f.strategy.program_type.as_deref(),
            Scalar::PointsPerDollar => f.design.rewards.loyalty_points.points_per_dollar.as_deref(),
        }
    }

    fn slot(self, f: &mut LoyaltyFields) -> &mut Option<String> {
        match self {
            Scalar::ProgramName => &mut f.program_name,
            Scalar::Description => &mut f.description,
            Scalar::Eligibility => &mut f.eligibility,
            Scalar::SignupBonus => &mut f.signup_bonus,
            Scalar::Industry => &mut f.strategy.industry,
            Scalar::ProgramType => &mut f.strategy.program_type,
            Scalar::PointsPerDollar => &mut f.design.rewards.loyalty_points.points_per_dollar,
        }
    }
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// Case-insensitive, whitespace-collapsed identity of a text value.
fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn union_strings(existing: &mut Vec<String>, incoming: &[String]) {
    for item in incoming {
        let key = normalize_key(item);
        if key.is_empty() || existing.iter().any(|e| normalize_key(e) == key) {
            continue;
        }
        existing.push(item.trim().to_string());
    }
}

/// An entity in one of the record's lists.
trait MergeEntry: Clone + PartialEq {
    /// Normalized identifier, if the entry carries one.
    fn key(&self) -> Option<String>;

    /// Number of non-empty fields.
    fn filled(&self) -> usize;

    /// Called on the surviving entry of a duplicate pair.
    fn absorb_lists(&mut self, _earlier: &Self, _later: &Self) {}
}

fn key_of(name: &Option<String>) -> Option<String> {
    name.as_deref().map(normalize_key).filter(|k| !k.is_empty())
}

fn union_entries<T: MergeEntry>(existing: &mut Vec<T>, incoming: &[T]) {
    for item in incoming {
        if item.filled() == 0 {
            continue;
        }
        let Some(key) = item.key() else {
            // No identifier: only exact duplicates can be recognized.
            if !existing.contains(item) {
                existing.push(item.clone());
            }
            continue;
        };

        match existing.iter().position(|e| e.key().as_deref() == Some(key.as_str())) {
            Some(pos) => {
                let earlier = existing[pos].clone();
                let mut survivor = if item.filled() > earlier.filled() {
                    item.clone()
                } else {
                    earlier.clone()
                };
                survivor.absorb_lists(&earlier, item);
                existing[pos] = survivor;
            }
            None => existing.push(item.clone()),
        }
    }
}

impl MergeEntry for Segment {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [is_filled(&self.name), is_filled(&self.criteria), self.approx_users.is_some()]
            .into_iter()
            .filter(|f| *f)
            .count()
    }
}

impl MergeEntry for Tier {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [
            is_filled(&self.name),
            is_filled(&self.range),
            is_filled(&self.multiplier_text),
            self.benefits.iter().any(|b| !b.trim().is_empty()),
        ]
        .into_iter()
        .filter(|f| *f)
        .count()
    }

    fn absorb_lists(&mut self, earlier: &Self, later: &Self) {
        let mut benefits = Vec::new();
        union_strings(&mut benefits, &earlier.benefits);
        union_strings(&mut benefits, &later.benefits);
        self.benefits = benefits;
    }
}

impl MergeEntry for Incentive {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [is_filled(&self.name), is_filled(&self.description)]
            .into_iter()
            .filter(|f| *f)
            .count()
    }
}

impl MergeEntry for AchievementBadge {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [is_filled(&self.name), is_filled(&self.criteria), is_filled(&self.reward)]
            .into_iter()
            .filter(|f| *f)
            .count()
    }
}

impl MergeEntry for GiftCard {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [
            is_filled(&self.name),
            is_filled(&self.redemption_points),
            is_filled(&self.validity_days),
        ]
        .into_iter()
        .filter(|f| *f)
        .count()
    }
}

impl MergeEntry for CatalogProduct {
    fn key(&self) -> Option<String> {
        key_of(&self.name)
    }

    fn filled(&self) -> usize {
        [is_filled(&self.name), is_filled(&self.point_cost)]
            .into_iter()
            .filter(|f| *f)
            .count()
    }
}

impl MergeEntry for Faq {
    fn key(&self) -> Option<String> {
        key_of(&self.question)
    }

    fn filled(&self) -> usize {
        [is_filled(&self.question), is_filled(&self.answer)]
            .into_iter()
            .filter(|f| *f)
            .count()
    }
}
