//! Source dataset acquisition.
//!
//! A dataset enters a run either by reference (an `http(s)` or `file` URL
//! that is fetched into the content-addressed source path) or by direct
//! upload (bytes stored under the uploads directory, then handed back as a
//! `file://` address that goes through the by-reference path like any other).

mod upload;

use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use graphfeat_shared::{AcquisitionSettings, GraphFeatError, Result};

pub use upload::{UploadedSource, store_upload};

/// Maximum number of redirects to follow when fetching a source.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for acquisition requests.
const USER_AGENT: &str = concat!("graphfeat/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Materializes source addresses into local files.
pub struct Fetcher {
    client: Client,
    max_bytes: u64,
    /// Directory `file://` sources must live under; `None` refuses them all.
    local_root: Option<PathBuf>,
}

impl Fetcher {
    /// Create a fetcher with the given limits.
    pub fn new(settings: &AcquisitionSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                GraphFeatError::Acquisition(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
            local_root: None,
        })
    }

    /// Accept `file://` sources, but only under `root` (normally the uploads
    /// directory).
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    /// Fetch `address` and write its content to `dest`.
    ///
    /// The content is first written to a `.part` sibling and renamed into
    /// place, so `dest` is either complete or untouched.
    #[instrument(skip_all, fields(address = %address, dest = %dest.display()))]
    pub async fn acquire(&self, address: &str, dest: &Path) -> Result<PathBuf> {
        let url = Url::parse(address).map_err(|e| {
            GraphFeatError::Acquisition(format!("malformed source address '{address}': {e}"))
        })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GraphFeatError::io(parent, e))?;
        }

        let part = part_path(dest);
        let outcome = match url.scheme() {
            "http" | "https" => self.download(&url, &part).await,
            "file" => self.copy_local(&url, &part).await,
            other => Err(GraphFeatError::Acquisition(format!(
                "unsupported address scheme '{other}' in {address}"
            ))),
        };

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&part).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part, dest).await {
            discard(&part).await;
            return Err(GraphFeatError::io(dest, e));
        }

        info!(bytes, path = %dest.display(), "source acquired");
        Ok(dest.to_path_buf())
    }

    /// Stream an HTTP body into `part`, enforcing the size limit.
    async fn download(&self, url: &Url, part: &Path) -> Result<u64> {
        debug!(%url, "downloading source");

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| GraphFeatError::Acquisition(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GraphFeatError::Acquisition(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(GraphFeatError::Acquisition(format!(
                    "{url}: source too large ({len} bytes, max {})",
                    self.max_bytes
                )));
            }
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| GraphFeatError::io(part, e))?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| GraphFeatError::Acquisition(format!("{url}: failed to read body: {e}")))?
        {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(GraphFeatError::Acquisition(format!(
                    "{url}: source exceeds {} bytes",
                    self.max_bytes
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| GraphFeatError::io(part, e))?;
        }

        file.flush().await.map_err(|e| GraphFeatError::io(part, e))?;
        Ok(written)
    }

    /// Copy a `file://` source into `part`.
    async fn copy_local(&self, url: &Url, part: &Path) -> Result<u64> {
        let source = url.to_file_path().map_err(|()| {
            GraphFeatError::Acquisition(format!("{url}: not a local file path"))
        })?;

        let source = self.confine_local(&source).await?;

        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| GraphFeatError::Acquisition(format!("{}: {e}", source.display())))?;

        if !meta.is_file() {
            return Err(GraphFeatError::Acquisition(format!(
                "{}: not a regular file",
                source.display()
            )));
        }
        if meta.len() > self.max_bytes {
            return Err(GraphFeatError::Acquisition(format!(
                "{}: source too large ({} bytes, max {})",
                source.display(),
                meta.len(),
                self.max_bytes
            )));
        }

        tokio::fs::copy(&source, part)
            .await
            .map_err(|e| GraphFeatError::Acquisition(format!("{}: {e}", source.display())))
    }
}

impl Fetcher {
    /// Resolve a local source and check it lies under the local root.
    async fn confine_local(&self, source: &Path) -> Result<PathBuf> {
        let Some(root) = &self.local_root else {
            return Err(GraphFeatError::Acquisition(format!(
                "{}: local file sources are not accepted",
                source.display()
            )));
        };

        let source = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| GraphFeatError::Acquisition(format!("{}: {e}", source.display())))?;
        let root = tokio::fs::canonicalize(root).await.map_err(|e| {
            GraphFeatError::Acquisition(format!("{}: {e}", root.display()))
        })?;

        if !source.starts_with(&root) {
            warn!(path = %source.display(), root = %root.display(), "refusing local source outside uploads");
            return Err(GraphFeatError::Acquisition(format!(
                "{}: local sources must be under {}",
                source.display(),
                root.display()
            )));
        }

        Ok(source)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => debug!(path = %part.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %part.display(), error = %e, "could not remove partial download"),
    }
}
