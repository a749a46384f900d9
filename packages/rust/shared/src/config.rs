//! Application configuration for LoyaltyScout.
//!
//! User config lives at `~/.loyaltyscout/loyaltyscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoyaltyScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "loyaltyscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".loyaltyscout";

/// Keywords that mark a URL as loyalty-relevant.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "reward",
    "loyalty",
    "points",
    "member",
    "membership",
    "tier",
    "level",
    "status",
    "gold",
    "silver",
    "platinum",
    "bronze",
    "vip",
    "elite",
    "premier",
    "plus",
    "earn",
    "earning",
    "redeem",
    "redemption",
    "collect",
    "spend",
    "program",
    "club",
    "perks",
    "benefits",
    "bonus",
    "advantage",
    "terms",
    "conditions",
    "faq",
    "how-it-works",
];

/// Paths probed directly on every brand domain.
pub const DEFAULT_PROBE_PATHS: &[&str] = &[
    "/rewards",
    "/loyalty",
    "/membership",
    "/points",
    "/rewards/terms",
    "/rewards/faq",
    "/rewards/how-it-works",
    "/rewards/about",
    "/rewards/earn",
    "/rewards/redeem",
    "/rewards/tiers",
    "/rewards/benefits",
    "/loyalty-program",
    "/loyalty/terms",
    "/loyalty/faq",
    "/member-rewards",
    "/member/rewards",
    "/club",
    "/perks",
    "/vip",
    "/plus",
    "/advantage",
    "/myrewards",
    "/my-rewards",
    "/terms",
    "/terms-and-conditions",
    "/legal/rewards-terms",
];

// ---------------------------------------------------------------------------
// Config structs (matching loyaltyscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// URL discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Fetch scheduling settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Classification service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Run output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum candidate URLs kept per brand.
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// Maximum link hops from the homepage.
    #[serde(default = "default_crawl_depth")]
    pub crawl_depth: u32,

    /// Node budget for the bounded crawl.
    #[serde(default = "default_max_crawl_pages")]
    pub max_crawl_pages: usize,

    /// Candidates scoring below this are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Fewer candidates than this marks discovery as sparse.
    #[serde(default = "default_min_useful_urls")]
    pub min_useful_urls: usize,

    /// Sub-sitemaps followed from a sitemap index.
    #[serde(default = "default_max_sub_sitemaps")]
    pub max_sub_sitemaps: usize,

    /// Concurrent path probes.
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// Relevance keywords.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Paths probed on every domain.
    #[serde(default = "default_probe_paths")]
    pub probe_paths: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_urls: default_max_urls(),
            crawl_depth: default_crawl_depth(),
            max_crawl_pages: default_max_crawl_pages(),
            min_score: default_min_score(),
            min_useful_urls: default_min_useful_urls(),
            max_sub_sitemaps: default_max_sub_sitemaps(),
            probe_concurrency: default_probe_concurrency(),
            keywords: default_keywords(),
            probe_paths: default_probe_paths(),
        }
    }
}

fn default_max_urls() -> usize {
    15
}
fn default_crawl_depth() -> u32 {
    2
}
fn default_max_crawl_pages() -> usize {
    50
}
fn default_min_score() -> f64 {
    1.0
}
fn default_min_useful_urls() -> usize {
    3
}
fn default_max_sub_sitemaps() -> usize {
    10
}
fn default_probe_concurrency() -> usize {
    4
}
fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| (*k).to_string()).collect()
}
fn default_probe_paths() -> Vec<String> {
    DEFAULT_PROBE_PATHS.iter().map(|p| (*p).to_string()).collect()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum spacing between any two requests, in ms.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per URL including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff before a retry, in ms (doubled on use).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for the gate delay after rate-limit responses, in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// External headless-render command; the URL is appended as the last
    /// argument and stdout is taken as the page body.
    #[serde(default)]
    pub render_command: Option<String>,

    /// Whole-run deadline in seconds. Unset means no deadline.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_delay_ms: default_max_delay_ms(),
            user_agent: default_user_agent(),
            render_command: None,
            run_timeout_secs: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_min_delay_ms() -> u64 {
    1500
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_attempts() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    concat!("LoyaltyScout/", env!("CARGO_PKG_VERSION")).into()
}

impl FetchConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for classification.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Page text is truncated to this many characters before classification.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_max_text_chars() -> usize {
    15_000
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives `run_<timestamp>/` folders.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.loyaltyscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LoyaltyScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.loyaltyscout/loyaltyscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LoyaltyScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LoyaltyScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LoyaltyScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = AppConfig::default().to_toml()?;

    std::fs::write(&path, content).map_err(|e| LoyaltyScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the classification API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LoyaltyScoutError::config(format!(
            "classification API key not found. Set the {var_name} environment variable \
             or pass --skip-llm."
        ))),
    }
}

impl AppConfig {
    /// Render the resolved config as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoyaltyScoutError::config(e.to_string()))
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(LoyaltyScoutError::config("fetch.concurrency must be at least 1"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(LoyaltyScoutError::config("fetch.max_attempts must be at least 1"));
        }
        if self.discovery.probe_concurrency == 0 {
            return Err(LoyaltyScoutError::config(
                "discovery.probe_concurrency must be at least 1",
            ));
        }
        if self.discovery.max_urls == 0 {
            return Err(LoyaltyScoutError::config("discovery.max_urls must be at least 1"));
        }
        if self.discovery.min_score < 0.0 {
            return Err(LoyaltyScoutError::config("discovery.min_score must not be negative"));
        }
        Ok(())
    }
}
