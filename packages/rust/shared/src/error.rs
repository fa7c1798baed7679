//! Error types for graphfeat.
//!
//! Library crates use [`GraphFeatError`] via `thiserror`.
//! The binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all graphfeat operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphFeatError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A request is missing a required field or carries an invalid value.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The source dataset could not be fetched or copied.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// A direct upload was rejected or could not be stored.
    #[error("upload error: {0}")]
    Upload(String),

    /// The requested embedding method is not in the registry.
    #[error("unsupported embedding method: {method}")]
    UnsupportedMethod { method: String },

    /// The external embedding process could not be started or exited unsuccessfully.
    #[error("embedding process failed (exit code {}): {stderr}", display_code(.exit_code))]
    AlgorithmFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The external embedding process exceeded its time budget and was killed.
    #[error("embedding process timed out after {timeout_secs}s")]
    AlgorithmTimeout { timeout_secs: u64 },

    /// The embedding process finished but an expected output file is absent.
    #[error("embedding output missing: {path:?}")]
    AlgorithmOutputMissing { path: PathBuf },

    /// The embedding output could not be turned into a feature table.
    #[error("assembly error: {message}")]
    Assembly { message: String },

    /// The remote repository rejected or failed the dataset upload.
    #[error("publication error: {0}")]
    Publication(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GraphFeatError>;

impl GraphFeatError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an assembly error from any displayable message.
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in API error bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Acquisition(_) => "acquisition",
            Self::Upload(_) => "upload",
            Self::UnsupportedMethod { .. } => "unsupported_method",
            Self::AlgorithmFailed { .. } => "algorithm_failed",
            Self::AlgorithmTimeout { .. } => "algorithm_timeout",
            Self::AlgorithmOutputMissing { .. } => "algorithm_output_missing",
            Self::Assembly { .. } => "assembly",
            Self::Publication(_) => "publication",
            Self::Io { .. } => "io",
        }
    }
}
