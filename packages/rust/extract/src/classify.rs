//! Classification service client.
//!
//! A [`Classifier`] turns page text into draft [`LoyaltyFields`] and,
//! optionally, a page-type label. [`OpenRouterClassifier`] talks to any
//! OpenAI-compatible chat-completions endpoint in JSON mode;
//! [`OfflineClassifier`] is used with `--skip-llm` and returns nothing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use loyaltyscout_shared::{LlmConfig, LoyaltyFields, LoyaltyScoutError, PageType, Result};

/// User-Agent string for classification requests.
const USER_AGENT: &str = concat!("LoyaltyScout/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for the classification endpoint.
const REQUEST_TIMEOUT_SECS: u64 = 120;

const SYSTEM_PROMPT: &str = r#"You extract structured loyalty program information from web page content.

Rules:
1. Only extract information that is explicitly stated in the page text.
2. Never invent or infer values. If something is not mentioned, use null or an empty array.
3. Quote the source wording where possible.
4. Membership tiers (e.g. Silver, Gold) are not the same as redemption levels (e.g. 25 Stars, 100 Stars); redemption levels belong in catalog_products.
5. Set "pageType" to the single best description of this page: one of "overview", "terms", "faq", "tiers", "earn", "redeem", "other".

Return one JSON object with exactly this structure:
{
  "pageType": "string",
  "programName": "string or null",
  "description": "string or null",
  "eligibility": "string or null",
  "signupBonus": "string or null",
  "strategy": {
    "industry": "string or null",
    "programType": "string or null",
    "goals": ["string"],
    "behaviors": ["string"],
    "audience": ["string"],
    "channels": ["string"]
  },
  "design": {
    "segments": [{"name": "string", "criteria": "string", "approx_users": null}],
    "tiers": [{"name": "string", "range": "string", "multiplierText": "string", "benefits": ["string"]}],
    "incentives": [{"name": "string", "description": "string or null"}],
    "rewards": {
      "loyalty_points": {"points_per_dollar": "string or null"},
      "achievement_badges": [{"Name": "string", "Criteria": "string", "Reward": "string"}],
      "gift_cards": [{"Name": "string", "redemption_points": "string", "validity_days": "string"}],
      "catalog_products": [{"Name": "string", "point_cost": "string"}]
    }
  },
  "faqs": [{"question": "string", "answer": "string"}]
}"#;

// ---------------------------------------------------------------------------
// Classifier trait
// ---------------------------------------------------------------------------

/// Draft extraction for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub fields: LoyaltyFields,
    /// Page-type label reported by the service, if any.
    pub page_type: Option<PageType>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, brand: &str, url: &str, text: &str) -> Result<Classification>;

    /// Identifier recorded in the run summary.
    fn name(&self) -> String;
}

/// Returns empty drafts without calling anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClassifier;

#[async_trait]
impl Classifier for OfflineClassifier {
    async fn classify(&self, _brand: &str, _url: &str, _text: &str) -> Result<Classification> {
        Ok(Classification::default())
    }

    fn name(&self) -> String {
        "offline".into()
    }
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterClassifier
// ---------------------------------------------------------------------------

/// Chat-completions classifier (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct OpenRouterClassifier {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_text_chars: usize,
}

impl OpenRouterClassifier {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                LoyaltyScoutError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_text_chars: config.max_text_chars,
        })
    }
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn classify(&self, brand: &str, url: &str, text: &str) -> Result<Classification> {
        let page_text = truncate_chars(text, self.max_text_chars);
        let user_prompt = format!(
            "Extract loyalty program information from this {brand} webpage:\n\n\
             URL: {url}\n\n--- PAGE CONTENT ---\n{page_text}\n--- END CONTENT ---\n\n\
             Return the structured JSON extraction."
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LoyaltyScoutError::Network(format!("classification request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(LoyaltyScoutError::Classification(format!(
                "service returned {status}: {snippet}"
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LoyaltyScoutError::Classification(format!("malformed response: {e}")))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LoyaltyScoutError::Classification("response had no content".into()))?;

        debug!(chars = content.len(), "classification received");
        parse_classification(&content)
    }

    fn name(&self) -> String {
        self.model.clone()
    }
}

/// Parse the model's JSON reply, tolerating a Markdown code fence around it.
pub fn parse_classification(content: &str) -> Result<Classification> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| LoyaltyScoutError::Classification(format!("reply is not JSON: {e}")))?;

    let page_type = value
        .get("pageType")
        .and_then(|v| v.as_str())
        .map(PageType::from_label);
    let fields: LoyaltyFields = serde_json::from_value(value).map_err(|e| {
        LoyaltyScoutError::Classification(format!("reply does not match schema: {e}"))
    })?;

    Ok(Classification { fields, page_type })
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n\n[... content truncated ...]", &text[..idx]),
        None => text.to_string(),
    }
}
