//! Append-only record of per-unit failures during a run.
//!
//! Every stage reports what it could not do here instead of aborting. The
//! ledger is written to `ledger.json` and summarized per brand at the end.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::LoyaltyScoutError;

/// Pipeline stage that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Fetch,
    Extraction,
    Merge,
    /// Writing run outputs.
    Output,
}

/// Failure category, mirroring the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    DiscoveryExhausted,
    FetchTerminalFailure,
    ExtractionFailure,
    MergeIncomplete,
    Network,
    Parse,
    Classification,
    Io,
    Validation,
    Config,
}

impl From<&LoyaltyScoutError> for ErrorKind {
    fn from(err: &LoyaltyScoutError) -> Self {
        match err {
            LoyaltyScoutError::Config { .. } => ErrorKind::Config,
            LoyaltyScoutError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            LoyaltyScoutError::DiscoveryExhausted { .. } => ErrorKind::DiscoveryExhausted,
            LoyaltyScoutError::FetchTerminalFailure { .. } => ErrorKind::FetchTerminalFailure,
            LoyaltyScoutError::ExtractionFailure { .. } => ErrorKind::ExtractionFailure,
            LoyaltyScoutError::MergeIncomplete { .. } => ErrorKind::MergeIncomplete,
            LoyaltyScoutError::Network(_) => ErrorKind::Network,
            LoyaltyScoutError::Parse { .. } => ErrorKind::Parse,
            LoyaltyScoutError::Classification(_) => ErrorKind::Classification,
            LoyaltyScoutError::Io { .. } => ErrorKind::Io,
            LoyaltyScoutError::Validation { .. } => ErrorKind::Validation,
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// URL or brand the failure concerns.
    pub subject: String,
    pub brand: Option<String>,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Thread-safe, append-only failure log shared by all workers of a run.
#[derive(Debug, Clone, Default)]
pub struct RunErrorLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
    brand: Option<String>,
}

impl RunErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto the same ledger that tags every entry with `brand`.
    pub fn scoped(&self, brand: impl Into<String>) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            brand: Some(brand.into()),
        }
    }

    pub fn record(
        &self,
        stage: Stage,
        kind: ErrorKind,
        subject: impl Into<String>,
        reason: impl Into<String>,
    ) {
        let entry = LedgerEntry {
            subject: subject.into(),
            brand: self.brand.clone(),
            stage,
            kind,
            reason: reason.into(),
        };
        tracing::debug!(
            subject = %entry.subject,
            stage = ?entry.stage,
            kind = ?entry.kind,
            reason = %entry.reason,
            "ledger entry"
        );
        // A poisoned lock still holds valid entries; keep appending.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    /// Record an error value, deriving the kind from its variant.
    pub fn record_error(&self, stage: Stage, subject: impl Into<String>, err: &LoyaltyScoutError) {
        self.record(stage, ErrorKind::from(err), subject, err.to_string());
    }

    /// Copy of all entries in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Entries tagged with the given brand.
    pub fn entries_for(&self, brand: &str) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.brand.as_deref() == Some(brand))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
