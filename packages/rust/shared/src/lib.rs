//! Shared types, error model, and configuration for DealScout.
//!
//! This crate is the foundation depended on by all other DealScout crates.
//! It provides:
//! - [`DealScoutError`] — the unified error type
//! - Domain types ([`SourceConfiguration`], [`CandidateDeal`], [`SourceType`], [`RunId`])
//! - Configuration ([`AppConfig`], tier limits, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, PipelineConfig, ServicesConfig, TierLimits, TiersConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_config,
};
pub use error::{DealScoutError, Result};
pub use types::{
    CandidateDeal, RunId, SourceConfiguration, SourceType, SubscriptionTier, normalize_keywords,
};
