//! Page sources: where response bodies come from.
//!
//! [`HttpSource`] is a plain `reqwest` client. [`HeadlessSource`] runs an
//! external headless-browser command for pages that need JavaScript, and
//! keeps using HTTP for HEAD probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tracing::debug;

use loyaltyscout_shared::{FetchConfig, LoyaltyScoutError, Result};

/// A response as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Parsed `Retry-After` header (delta-seconds form only).
    pub retry_after: Option<Duration>,
}

/// Transport-level failure: no HTTP status was received.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

/// Anything that can produce page bodies for URLs.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Retrieve the full body of `url`.
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError>;

    /// Issue a HEAD request and return the status code.
    async fn head(&self, url: &str) -> std::result::Result<u16, TransportError>;

    /// Short name for logs and raw-page headers.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// HttpSource
// ---------------------------------------------------------------------------

/// Plain HTTP page source.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                LoyaltyScoutError::Network(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl PageSource for HttpSource {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response.bytes().await.map_err(transport_error)?.to_vec();
        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }

    async fn head(&self, url: &str) -> std::result::Result<u16, TransportError> {
        let response = self.client.head(url).send().await.map_err(transport_error)?;
        Ok(response.status().as_u16())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// HeadlessSource
// ---------------------------------------------------------------------------

/// Page source backed by an external render command such as
/// `chromium --headless --dump-dom`. The URL is appended as the final
/// argument and stdout is taken as the rendered HTML.
#[derive(Debug, Clone)]
pub struct HeadlessSource {
    program: String,
    args: Vec<String>,
    http: HttpSource,
}

impl HeadlessSource {
    pub fn new(command: &str, config: &FetchConfig) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| LoyaltyScoutError::config("fetch.render_command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            http: HttpSource::new(config)?,
        })
    }
}

#[async_trait]
impl PageSource for HeadlessSource {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError> {
        debug!(program = %self.program, %url, "rendering page");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::Network(format!("render command failed to start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Network(format!(
                "render command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(TransportError::Network(
                "render command produced no output".into(),
            ));
        }

        Ok(RawResponse {
            status: 200,
            body: output.stdout,
            retry_after: None,
        })
    }

    async fn head(&self, url: &str) -> std::result::Result<u16, TransportError> {
        self.http.head(url).await
    }

    fn name(&self) -> &'static str {
        "headless"
    }
}

/// Build the configured page source.
pub fn source_from_config(config: &FetchConfig) -> Result<Arc<dyn PageSource>> {
    Ok(match config.render_command.as_deref() {
        Some(command) if !command.trim().is_empty() => {
            Arc::new(HeadlessSource::new(command, config)?)
        }
        _ => Arc::new(HttpSource::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn http_source_reads_status_and_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/rewards"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let source = HttpSource::new(&FetchConfig::default()).expect("client");

        let resp = source
            .get(&format!("{}/busy", server.uri()))
            .await
            .expect("response");
        assert_eq!(resp.status, 429);
        assert_eq!(resp.retry_after, Some(Duration::from_secs(7)));

        let status = source
            .head(&format!("{}/rewards", server.uri()))
            .await
            .expect("head");
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn headless_source_uses_command_stdout() {
        let source = HeadlessSource::new("echo rendered", &FetchConfig::default()).expect("source");
        let resp = source.get("https://example.com/rewards").await.expect("render");
        let body = String::from_utf8(resp.body).expect("utf8");
        assert_eq!(body.trim(), "rendered https://example.com/rewards");
        assert_eq!(source.name(), "headless");
    }

    #[test]
    fn empty_render_command_is_config_error() {
        let err = HeadlessSource::new("   ", &FetchConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }
}
