//! Per-URL fetch results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    HttpError(u16),
    Timeout,
    NetworkError(String),
    /// Never issued because the run was aborted.
    Cancelled,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }

    /// Worth one more attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchStatus::Timeout | FetchStatus::NetworkError(_) => true,
            FetchStatus::HttpError(code) => (500..600).contains(code),
            _ => false,
        }
    }

    /// The site refused us rather than the page being absent.
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchStatus::HttpError(401 | 403 | 429))
    }

    pub fn describe(&self) -> String {
        match self {
            FetchStatus::Ok => "ok".into(),
            FetchStatus::HttpError(code) => format!("HTTP {code}"),
            FetchStatus::Timeout => "timed out".into(),
            FetchStatus::NetworkError(msg) => format!("network error: {msg}"),
            FetchStatus::Cancelled => "cancelled before issue".into(),
        }
    }
}

/// Exactly one per URL per batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub url: String,
    pub status: FetchStatus,
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
    pub attempt_count: u32,
    pub elapsed_ms: u64,
    pub fetched_at: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: FetchStatus::Cancelled,
            body: None,
            attempt_count: 0,
            elapsed_ms: 0,
            fetched_at: Utc::now(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(FetchStatus::Timeout.is_transient());
        assert!(FetchStatus::NetworkError("reset".into()).is_transient());
        assert!(FetchStatus::HttpError(503).is_transient());
        assert!(!FetchStatus::HttpError(404).is_transient());
        assert!(!FetchStatus::HttpError(429).is_transient());
        assert!(!FetchStatus::Cancelled.is_transient());
    }

    #[test]
    fn status_serializes_tagged() {
        let json = serde_json::to_string(&FetchStatus::HttpError(404)).expect("serialize");
        assert_eq!(json, r#"{"kind":"http_error","detail":404}"#);
        let json = serde_json::to_string(&FetchStatus::Ok).expect("serialize");
        assert_eq!(json, r#"{"kind":"ok"}"#);
    }
}
