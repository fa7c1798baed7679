//! OpenML repository client.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, instrument};
use url::Url;

use graphfeat_shared::{GraphFeatError, RepositorySettings, Result};

use crate::DatasetRepository;
use crate::description::DatasetDescription;

/// User-Agent string for repository requests.
const USER_AGENT: &str = concat!("graphfeat/", env!("CARGO_PKG_VERSION"));

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<oml:id>\s*(\d+)\s*</oml:id>").expect("valid regex"));
static ERROR_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<oml:code>\s*([^<]*?)\s*</oml:code>").expect("valid regex"));
static ERROR_MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<oml:message>\s*(.*?)\s*</oml:message>").expect("valid regex")
});

/// Client for the OpenML v1 data upload API.
pub struct OpenMlRepository {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl OpenMlRepository {
    pub fn new(settings: &RepositorySettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                GraphFeatError::Publication(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn upload_endpoint(&self) -> String {
        format!("{}/api/v1/data", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl DatasetRepository for OpenMlRepository {
    #[instrument(skip_all, fields(name = %description.name, data = %data_file.display()))]
    async fn create_dataset(&self, description: &DatasetDescription, data_file: &Path) -> Result<u64> {
        let data = tokio::fs::read(data_file)
            .await
            .map_err(|e| GraphFeatError::io(data_file, e))?;

        let description_xml = description.to_xml();
        debug!(xml = %description_xml, "dataset description");

        let file_name = data_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset.arff".to_string());

        let form = Form::new()
            .part(
                "description",
                Part::text(description_xml)
                    .file_name("description.xml")
                    .mime_str("text/xml")
                    .map_err(|e| GraphFeatError::Publication(e.to_string()))?,
            )
            .part(
                "dataset",
                Part::bytes(data)
                    .file_name(file_name)
                    .mime_str("text/plain")
                    .map_err(|e| GraphFeatError::Publication(e.to_string()))?,
            );

        let endpoint = self.upload_endpoint();
        let response = self
            .client
            .post(&endpoint)
            .query(&[("api_key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| GraphFeatError::Publication(format!("{endpoint}: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                GraphFeatError::Publication(format!(
                    "{endpoint}: failed to read body: {}",
                    e.without_url()
                ))
            })?;

        if !status.is_success() {
            return Err(GraphFeatError::Publication(format!(
                "{endpoint}: HTTP {status}: {}",
                describe_error(&body)
            )));
        }

        let id = parse_upload_id(&body)?;
        info!(id, "dataset created");
        Ok(id)
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Extract the dataset id from an `upload_data_set` response.
pub fn parse_upload_id(body: &str) -> Result<u64> {
    let captured = ID_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            GraphFeatError::Publication(format!(
                "no dataset id in repository response: {}",
                describe_error(body)
            ))
        })?;

    captured.as_str().parse().map_err(|e| {
        GraphFeatError::Publication(format!("invalid dataset id '{}': {e}", captured.as_str()))
    })
}

/// Summarize an OpenML error document, or a prefix of an unknown body.
fn describe_error(body: &str) -> String {
    let code = ERROR_CODE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let message = ERROR_MESSAGE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    match (code, message) {
        (Some(code), Some(message)) => format!("code {code}: {message}"),
        (None, Some(message)) => message.to_string(),
        _ => body.chars().take(200).collect(),
    }
}
