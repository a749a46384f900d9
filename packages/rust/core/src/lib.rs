//! Run orchestration and domain logic for LoyaltyScout.
//!
//! This crate ties together discovery, fetching and extraction into the
//! harvest run ([`Harvester`]), reconciles page fragments into one record per
//! brand ([`merge_fragments`]), and writes the per-run output directory.

pub mod input;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod summary;

pub use input::{load_brand_targets, load_manual_seeds};
pub use merge::{merge_fragments, remerge};
pub use output::RunWriter;
pub use pipeline::{HarvestResult, Harvester, ProgressReporter, SilentProgress};
pub use summary::{BrandCounts, BrandResult, BrandStatus, RunSummary, RunTotals};
