//! The structured loyalty-program record.
//!
//! [`LoyaltyFields`] is the "partial record" shape shared by the classifier's
//! per-page drafts and the final merged record. JSON field names follow the
//! published output format, so the same type is used to parse model output
//! and to write `structured/<brand>.json`.
//!
//! Every field is optional or a (possibly empty) list: an absent value means
//! "not found on any page", never a default guess.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Deserialize a section object, falling back to `T::default()` when the
/// value is `null`, not an object, or does not fit the section's shape.
///
/// Model output routinely contains `"strategy": null`; treating that as an
/// empty section keeps one malformed field from discarding the whole draft.
fn lenient_section<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => T::deserialize(value).unwrap_or_default(),
        _ => T::default(),
    })
}

/// Deserialize a list of entries. `null` is an empty list, a lone object is a
/// one-entry list, and entries that do not fit are dropped individually.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        Some(entry @ Value::Object(_)) => vec![entry],
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

/// Deserialize a text leaf that the model may have sent as a number or bool.
///
/// Numbers and bools become their JSON text; arrays and objects become `None`.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Deserialize a count that may arrive as a number or as text such as
/// `"2,000,000"`. Anything that is not a whole non-negative count is `None`.
fn opt_u64_lenient<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => {
            let digits: String = s.trim().chars().filter(|c| !matches!(c, ',' | '_')).collect();
            digits.parse().ok()
        }
        _ => None,
    })
}

/// Deserialize a list of text items, accepting a bare string for a
/// one-item list. Items that are not text or numbers are dropped.
fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
        None => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// All loyalty-program fields extracted from one page or merged across many.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyFields {
    /// Official program name (e.g., "Starbucks Rewards").
    #[serde(default, deserialize_with = "string_or_number")]
    pub program_name: Option<String>,
    /// Short description of the program.
    #[serde(default, deserialize_with = "string_or_number")]
    pub description: Option<String>,
    /// Who may join (age, residency, account requirements).
    #[serde(default, deserialize_with = "string_or_number")]
    pub eligibility: Option<String>,
    /// Bonus granted on signup, as stated by the brand.
    #[serde(default, deserialize_with = "string_or_number")]
    pub signup_bonus: Option<String>,
    /// Program strategy and business goals.
    #[serde(default, deserialize_with = "lenient_section")]
    pub strategy: Strategy,
    /// Program design: segments, tiers, incentives and rewards.
    #[serde(default, deserialize_with = "lenient_section")]
    pub design: Design,
    /// Frequently asked questions.
    #[serde(default, deserialize_with = "lenient_list")]
    pub faqs: Vec<Faq>,
}

/// `strategy` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    #[serde(default, deserialize_with = "string_or_number")]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub program_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub goals: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub behaviors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub audience: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub channels: Vec<String>,
}

/// `design` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Design {
    #[serde(default, deserialize_with = "lenient_list")]
    pub segments: Vec<Segment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tiers: Vec<Tier>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub incentives: Vec<Incentive>,
    #[serde(default, deserialize_with = "lenient_section")]
    pub rewards: Rewards,
}

/// Customer segment definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub criteria: Option<String>,
    #[serde(default, deserialize_with = "opt_u64_lenient")]
    pub approx_users: Option<u64>,
}

/// Loyalty tier / status level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    /// Qualification range (e.g., "0–499 points").
    #[serde(default, deserialize_with = "string_or_number")]
    pub range: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub multiplier_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub benefits: Vec<String>,
}

/// Campaign or incentive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incentive {
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub description: Option<String>,
}

/// `design.rewards` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rewards {
    #[serde(default, deserialize_with = "lenient_section")]
    pub loyalty_points: LoyaltyPoints,
    #[serde(default, deserialize_with = "lenient_list")]
    pub achievement_badges: Vec<AchievementBadge>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub gift_cards: Vec<GiftCard>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub catalog_products: Vec<CatalogProduct>,
}

/// Points earning rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyPoints {
    #[serde(default, deserialize_with = "string_or_number")]
    pub points_per_dollar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementBadge {
    #[serde(rename = "Name", default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(rename = "Criteria", default, deserialize_with = "string_or_number")]
    pub criteria: Option<String>,
    #[serde(rename = "Reward", default, deserialize_with = "string_or_number")]
    pub reward: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GiftCard {
    #[serde(rename = "Name", default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub redemption_points: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub validity_days: Option<String>,
}

/// Product redeemable for points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde(rename = "Name", default, deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub point_cost: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    #[serde(default, deserialize_with = "string_or_number")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub answer: Option<String>,
}

impl LoyaltyFields {
    /// Whether no field carries any content.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
