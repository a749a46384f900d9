//! Error types for LoyaltyScout.
//!
//! Library crates use [`LoyaltyScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Apart from [`LoyaltyScoutError::Config`], every variant describes a failure
//! scoped to one unit of work (a URL, a page or a brand). Callers record those
//! in the run's [`RunErrorLedger`](crate::RunErrorLedger) and keep going.

use std::path::PathBuf;

/// Top-level error type for all LoyaltyScout operations.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyScoutError {
    /// Configuration loading or validation error. The only fatal kind.
    #[error("config error: {message}")]
    Config { message: String },

    /// A URL was malformed, used an unsupported scheme, or left the brand's domain.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Discovery found no candidate pages for a domain.
    #[error("discovery exhausted for {domain}: no candidate URLs found")]
    DiscoveryExhausted { domain: String },

    /// A URL could not be retrieved after all retry attempts.
    #[error("fetch failed for {url}: {reason}")]
    FetchTerminalFailure { url: String, reason: String },

    /// A fetched body could not be turned into a page fragment.
    #[error("extraction failed for {url}: {message}")]
    ExtractionFailure { url: String, message: String },

    /// No usable fragments were available to build a brand's record.
    #[error("merge incomplete for {brand}: no usable page fragments")]
    MergeIncomplete { brand: String },

    /// Network/HTTP error outside the fetch scheduler (client setup, LLM calls).
    #[error("network error: {0}")]
    Network(String),

    /// HTML, XML or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// LLM classification error (API, quota, or response shape).
    #[error("classification error: {0}")]
    Classification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input rows, invalid settings, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LoyaltyScoutError>;

impl LoyaltyScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Reject a URL during normalization.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// A page body that could not be extracted.
    pub fn extraction(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtractionFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
