//! Shared types, error model, and configuration for patternlang.
//!
//! This crate is the foundation depended on by all other patternlang crates.
//! It provides:
//! - [`PatternLangError`] and [`DocumentError`]: the error taxonomy
//! - Domain types ([`Pattern`], [`Confidence`], [`Catalog`], [`ExpandedPattern`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, MAX_EXPANSION_DEPTH, MAX_UPDATE_INTERVAL_DAYS, ScheduleConfig, ServerConfig,
    ServiceConfig, SourceConfig, StorageConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{DocumentError, PatternLangError, Result};
pub use types::{
    Catalog, Confidence, DanglingLink, DocumentFailure, ExpandedPattern, IngestReport, Pattern,
    PatternId, RawLink, RunId,
};
