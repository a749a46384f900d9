//! Global request spacing shared by every worker of a run.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// Spaces requests at least `delay` apart across all callers.
///
/// Callers reserve the next free slot under the mutex and then sleep outside
/// it, so a slow request never holds the gate.
#[derive(Debug)]
pub struct RateGate {
    state: Mutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    next_slot: Option<Instant>,
    delay: Duration,
}

impl RateGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                next_slot: None,
                delay: min_delay,
            }),
        }
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let slot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + state.delay);
            slot
        };
        sleep_until(slot).await;
    }

    /// React to a rate-limit response: double the spacing for the rest of the
    /// run (capped at `max_delay`) and push the next slot past `retry_after`.
    ///
    /// Returns the new spacing.
    pub async fn slow_down(&self, max_delay: Duration, retry_after: Option<Duration>) -> Duration {
        let mut state = self.state.lock().await;
        let doubled = if state.delay.is_zero() {
            Duration::from_secs(1)
        } else {
            state.delay.saturating_mul(2)
        };
        state.delay = doubled.min(max_delay).max(state.delay);

        if let Some(wait) = retry_after {
            let earliest = Instant::now() + wait;
            if state.next_slot.is_none_or(|next| next < earliest) {
                state.next_slot = Some(earliest);
            }
            debug!(retry_after_ms = wait.as_millis() as u64, "honouring Retry-After");
        }

        warn!(delay_ms = state.delay.as_millis() as u64, "rate limited, slowing down");
        state.delay
    }

    /// Current spacing between requests.
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }
}
