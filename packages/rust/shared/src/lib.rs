//! Shared types, error model, and configuration for the EcoSpray backend.
//!
//! This crate is the foundation depended on by all other EcoSpray crates.
//! It provides:
//! - [`SiteError`]: the unified error type
//! - Import data model ([`NormalizedFile`], [`CrawlResult`], [`ExtractedContent`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrmConfig, GeminiConfig, GitHubConfig, ServerConfig, SiteConfig,
    StoreBackend, StoreConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, secret_from_env,
};
pub use error::{Result, SiteError};
pub use types::{
    CrawlResult, CrawledPage, ExtractedContent, FileBundle, NormalizedFile, PageError, Record,
    SourceType, TEXT_EXTENSIONS, is_text_path,
};
