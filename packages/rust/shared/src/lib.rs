//! Shared types, error model, and configuration for LoyaltyScout.
//!
//! This crate is the foundation depended on by all other LoyaltyScout crates.
//! It provides:
//! - [`LoyaltyScoutError`]: the unified error type
//! - Domain types ([`PageType`], [`PageFragment`], [`MergedRecord`], [`LoyaltyFields`])
//! - The per-run failure log ([`RunErrorLedger`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod ledger;
pub mod record;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, FetchConfig, LlmConfig, OutputConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{LoyaltyScoutError, Result};
pub use ledger::{ErrorKind, LedgerEntry, RunErrorLedger, Stage};
pub use record::LoyaltyFields;
pub use types::{
    BrandTarget, ManualSeed, MergedRecord, PageFragment, PageType, RunId, SourceRef, brand_slug,
};
