//! Page retrieval for LoyaltyScout.
//!
//! The [`FetchScheduler`] owns the run's single [`RateGate`], applies the
//! retry policy, and turns every requested URL into exactly one
//! [`FetchOutcome`]. Discovery uses its `fetch_one` and `probe` primitives so
//! that probes and crawl fetches count against the same rate limit.

pub mod gate;
pub mod outcome;
pub mod scheduler;
pub mod source;

pub use gate::RateGate;
pub use outcome::{FetchOutcome, FetchStatus};
pub use scheduler::{FetchScheduler, RetryPolicy};
pub use source::{
    HeadlessSource, HttpSource, PageSource, RawResponse, TransportError, source_from_config,
};
