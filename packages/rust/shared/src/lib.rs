//! Shared types, error model, and configuration for glossgen.
//!
//! This crate is the foundation depended on by all other glossgen crates.
//! It provides:
//! - [`GlossgenError`] — the unified error type
//! - Domain types ([`ResourceRecord`], [`RunRecord`], [`StepRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading, API key resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionSettings, DefaultsConfig, RetrySettings, ScrapeSettings, SearchSettings,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    resolve_api_key, validate_api_keys,
};
pub use error::{GlossgenError, Result};
pub use types::{
    CachePolicy, ResourceKind, ResourceRecord, RunId, RunRecord, StepRecord, StepStatus,
    resource_key_hash,
};
