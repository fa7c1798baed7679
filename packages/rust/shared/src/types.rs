//! Core domain types for a graphfeat run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GraphFeatError, Result};

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

/// Algorithm tuning values parsed from a `key1=value1;key2=value2` string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, String>);

impl Hyperparameters {
    /// Parse a hyperparameter string. Parsing never fails: entries without
    /// `=` are logged and skipped, empty segments are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut map = BTreeMap::new();

        for entry in raw.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let Some((key, value)) = entry.split_once('=') else {
                warn!(entry, hyperp = raw, "skipping malformed hyperparameter");
                continue;
            };

            let key = key.trim();
            if key.is_empty() {
                warn!(entry, hyperp = raw, "skipping hyperparameter with empty key");
                continue;
            }

            if let Some(previous) = map.insert(key.to_string(), value.trim().to_string()) {
                warn!(key, previous, "duplicate hyperparameter, keeping last value");
            }
        }

        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders as `{k1=v1, k2=v2}`, the form used in published descriptions.
impl std::fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// EmbeddingRequest
// ---------------------------------------------------------------------------

/// A request to embed one source dataset and publish the resulting table.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    /// URL or local `file://` reference of the dataset.
    pub source_address: String,
    /// Name under which the table is published.
    pub display_name: String,
    /// Embedding method name, matched case-insensitively.
    pub method: String,
    /// The hyperparameter string exactly as submitted.
    pub hyperp: String,
    /// Parsed form of `hyperp`.
    pub hyperparameters: Hyperparameters,
}

impl EmbeddingRequest {
    pub fn new(
        source_address: impl Into<String>,
        display_name: impl Into<String>,
        method: impl Into<String>,
        hyperp: impl Into<String>,
    ) -> Self {
        let hyperp = hyperp.into();
        let hyperparameters = Hyperparameters::parse(&hyperp);
        Self {
            source_address: source_address.into(),
            display_name: display_name.into(),
            method: method.into(),
            hyperp,
            hyperparameters,
        }
    }

    /// Check that the address, name, and method are all present.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("dataset", &self.source_address),
            ("name", &self.display_name),
            ("method", &self.method),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphFeatError::validation(format!(
                "required field(s) empty: {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// WorkingSet
// ---------------------------------------------------------------------------

/// Local paths owned by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    /// Where the acquired source dataset is written.
    pub local_source_path: PathBuf,
    /// Directory receiving the algorithm's outputs and the feature table.
    pub work_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Embedding output and feature table
// ---------------------------------------------------------------------------

/// Resources and their vectors as read back from the algorithm's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingResult {
    pub resource_uris: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
}

/// One row of a [`FeatureTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub identifier: String,
    pub values: Vec<f64>,
}

/// A schema-tagged table pairing each resource with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub relation_name: String,
    /// First entry names the identifier column, the rest the numeric dimensions.
    pub attribute_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Number of numeric dimension columns.
    pub fn dimensions(&self) -> usize {
        self.attribute_names.len().saturating_sub(1)
    }
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// A dataset accepted by the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataset {
    pub id: u64,
    pub url: String,
}

/// The outcome of a successful run, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub dataset: String,
    pub method: String,
    pub hyperp: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// States of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validating,
    Acquiring,
    Embedding,
    Assembling,
    Publishing,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Acquiring => "acquiring",
            Self::Embedding => "embedding",
            Self::Assembling => "assembling",
            Self::Publishing => "publishing",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
