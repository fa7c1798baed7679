//! Shared types, error model, and configuration for graphfeat.
//!
//! This crate is the foundation depended on by all other graphfeat crates.
//! It provides:
//! - [`GraphFeatError`], the unified error type
//! - Domain types ([`EmbeddingRequest`], [`FeatureTable`], [`PublishedDataset`], ...)
//! - Content addressing of source datasets ([`address`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod address;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AcquisitionSettings, AlgorithmSettings, AppConfig, RepositorySettings, ServerConfig,
    Settings, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key,
};
pub use error::{GraphFeatError, Result};
pub use types::{
    EmbeddingRequest, EmbeddingResponse, EmbeddingResult, FeatureRow, FeatureTable,
    Hyperparameters, PipelineStage, PublishedDataset, WorkingSet,
};
