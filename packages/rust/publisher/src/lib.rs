//! Publication of feature tables to a remote dataset repository.
//!
//! This crate provides:
//! - [`DatasetRepository`], the seam to the remote repository
//! - [`OpenMlRepository`], the OpenML v1 implementation
//! - [`publish`], which describes a table, uploads it, and builds its public URL

pub mod description;
pub mod openml;

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info, instrument};
use url::Url;

use graphfeat_shared::{GraphFeatError, Hyperparameters, PublishedDataset, Result};

pub use description::DatasetDescription;
pub use openml::OpenMlRepository;

/// A remote repository that stores datasets and assigns them numeric ids.
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Upload `data_file` with `description`, returning the assigned id.
    async fn create_dataset(&self, description: &DatasetDescription, data_file: &Path) -> Result<u64>;

    /// Base URL public dataset pages are served under.
    fn base_url(&self) -> &Url;
}

/// Canonical page of a published dataset: `<base>/d/<id>`.
pub fn dataset_url(base_url: &Url, id: u64) -> String {
    format!("{}/d/{id}", base_url.as_str().trim_end_matches('/'))
}

/// Describe and upload a rendered feature table.
///
/// Every failure is logged and returned as [`GraphFeatError::Publication`];
/// no id is returned unless the repository accepted the dataset.
#[instrument(skip_all, fields(name = %name, method = %method))]
pub async fn publish(
    repository: &dyn DatasetRepository,
    table_file: &Path,
    name: &str,
    method: &str,
    hyperparameters: &Hyperparameters,
) -> Result<PublishedDataset> {
    let description = DatasetDescription::for_embedding(name, method, hyperparameters);

    let id = match repository.create_dataset(&description, table_file).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "dataset upload failed");
            return Err(match e {
                GraphFeatError::Publication(msg) => GraphFeatError::Publication(msg),
                other => GraphFeatError::Publication(other.to_string()),
            });
        }
    };

    let url = dataset_url(repository.base_url(), id);
    info!(id, %url, "dataset published");

    Ok(PublishedDataset { id, url })
}
