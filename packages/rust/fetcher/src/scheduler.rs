//! Rate-limited, retrying, cancellable fetch scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use loyaltyscout_shared::{ErrorKind, FetchConfig, Result, RunErrorLedger, Stage};

use crate::gate::RateGate;
use crate::outcome::{FetchOutcome, FetchStatus};
use crate::source::{PageSource, TransportError, source_from_config};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt limits and timing for one URL.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            max_delay: config.max_delay(),
            timeout: config.timeout(),
        }
    }
}

/// What to do after a failed attempt.
enum NextStep {
    Backoff(Duration),
    SlowDown(Option<Duration>),
    GiveUp,
}

impl RetryPolicy {
    fn next_step(&self, status: &FetchStatus, retry_after: Option<Duration>, attempt: u32) -> NextStep {
        if attempt >= self.max_attempts {
            return NextStep::GiveUp;
        }
        match status {
            FetchStatus::HttpError(429) => NextStep::SlowDown(retry_after),
            s if s.is_transient() => NextStep::Backoff(self.backoff_base * 2),
            _ => NextStep::GiveUp,
        }
    }
}

// ---------------------------------------------------------------------------
// FetchScheduler
// ---------------------------------------------------------------------------

/// Retrieves pages for a run: every request passes one shared [`RateGate`].
pub struct FetchScheduler {
    source: Arc<dyn PageSource>,
    gate: Arc<RateGate>,
    policy: RetryPolicy,
    concurrency: usize,
    cancel: CancellationToken,
}

impl FetchScheduler {
    /// Build a scheduler with the page source selected by `config`.
    pub fn new(config: &FetchConfig, cancel: CancellationToken) -> Result<Self> {
        Ok(Self::with_source(source_from_config(config)?, config, cancel))
    }

    /// Build a scheduler over an explicit page source.
    pub fn with_source(
        source: Arc<dyn PageSource>,
        config: &FetchConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            gate: Arc::new(RateGate::new(config.min_delay())),
            policy: RetryPolicy::from(config),
            concurrency: config.concurrency.max(1),
            cancel,
        }
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Maximum requests in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Wait for a gate slot unless the run is cancelled first.
    async fn pass_gate(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.gate.acquire() => true,
        }
    }

    /// Fetch one URL with the retry policy applied.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_one(&self, url: &str) -> FetchOutcome {
        let started = Instant::now();
        let mut attempt = 0u32;
        let mut last_status = FetchStatus::Cancelled;

        loop {
            if !self.pass_gate().await {
                if attempt == 0 {
                    return FetchOutcome::cancelled(url);
                }
                break;
            }
            attempt += 1;

            let (status, body, retry_after) =
                match tokio::time::timeout(self.policy.timeout, self.source.get(url)).await {
                    Err(_) | Ok(Err(TransportError::Timeout)) => (FetchStatus::Timeout, None, None),
                    Ok(Err(TransportError::Network(msg))) => {
                        (FetchStatus::NetworkError(msg), None, None)
                    }
                    Ok(Ok(resp)) if (200..300).contains(&resp.status) => {
                        (FetchStatus::Ok, Some(resp.body), None)
                    }
                    Ok(Ok(resp)) => (FetchStatus::HttpError(resp.status), None, resp.retry_after),
                };

            if status.is_ok() {
                debug!(%url, attempt, "fetched");
                return FetchOutcome {
                    url: url.to_string(),
                    status,
                    body,
                    attempt_count: attempt,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    fetched_at: Utc::now(),
                };
            }

            match self.policy.next_step(&status, retry_after, attempt) {
                NextStep::Backoff(wait) => {
                    debug!(%url, attempt, status = %status.describe(), "retrying after backoff");
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                NextStep::SlowDown(retry_after) => {
                    self.gate.slow_down(self.policy.max_delay, retry_after).await;
                }
                NextStep::GiveUp => {
                    last_status = status;
                    break;
                }
            }
            last_status = status;
        }

        FetchOutcome {
            url: url.to_string(),
            status: last_status,
            body: None,
            attempt_count: attempt,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fetched_at: Utc::now(),
        }
    }

    /// Check whether `url` exists: HEAD, falling back to GET when the server
    /// answers 405. No retries.
    pub async fn probe(&self, url: &str) -> FetchStatus {
        if !self.pass_gate().await {
            return FetchStatus::Cancelled;
        }
        let head = tokio::time::timeout(self.policy.timeout, self.source.head(url)).await;
        let status = match head {
            Ok(Ok(405)) => {
                if !self.pass_gate().await {
                    return FetchStatus::Cancelled;
                }
                match tokio::time::timeout(self.policy.timeout, self.source.get(url)).await {
                    Ok(Ok(resp)) => resp.status,
                    Ok(Err(TransportError::Network(msg))) => {
                        return FetchStatus::NetworkError(msg);
                    }
                    Err(_) | Ok(Err(TransportError::Timeout)) => return FetchStatus::Timeout,
                }
            }
            Ok(Ok(code)) => code,
            Ok(Err(TransportError::Network(msg))) => return FetchStatus::NetworkError(msg),
            Err(_) | Ok(Err(TransportError::Timeout)) => return FetchStatus::Timeout,
        };

        if (200..300).contains(&status) {
            FetchStatus::Ok
        } else {
            FetchStatus::HttpError(status)
        }
    }

    /// Fetch a batch with bounded concurrency.
    ///
    /// Returns one outcome per input URL, in input order. Terminal failures
    /// are recorded in `ledger`; they never affect other URLs.
    #[instrument(skip_all, fields(urls = urls.len(), concurrency = self.concurrency))]
    pub async fn fetch_all(&self, urls: &[String], ledger: &RunErrorLedger) -> Vec<FetchOutcome> {
        let outcomes: Vec<FetchOutcome> = stream::iter(urls)
            .map(|url| self.fetch_one(url))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut failed = 0usize;
        let mut cancelled = 0usize;
        for outcome in outcomes.iter().filter(|o| !o.status.is_ok()) {
            // Never issued: the run stopped, the site did not refuse it.
            if outcome.status == FetchStatus::Cancelled {
                cancelled += 1;
                continue;
            }
            failed += 1;
            warn!(url = %outcome.url, status = %outcome.status.describe(), attempts = outcome.attempt_count, "fetch failed");
            ledger.record(
                Stage::Fetch,
                ErrorKind::FetchTerminalFailure,
                &outcome.url,
                format!(
                    "{} after {} attempt(s)",
                    outcome.status.describe(),
                    outcome.attempt_count
                ),
            );
        }

        info!(
            fetched = outcomes.len() - failed - cancelled,
            failed,
            cancelled,
            "batch complete"
        );
        outcomes
    }
}
