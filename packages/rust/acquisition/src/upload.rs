//! Direct uploads of source datasets.

use std::path::{Path, PathBuf};

use tracing::{error, info};
use url::Url;

use graphfeat_shared::{GraphFeatError, Result};

/// A stored upload, addressable by the by-reference acquisition path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedSource {
    /// `file://` URI of the stored file, usable as a source address.
    pub address: String,
    /// Display name the upload was submitted with.
    pub name: String,
    /// Absolute path of the stored file.
    pub path: PathBuf,
}

/// Store uploaded bytes under `uploads_dir/<original filename>`.
///
/// Only the final path component of `original_filename` is used. Nothing is
/// written when the payload, the name, or the filename is empty.
pub async fn store_upload(
    uploads_dir: &Path,
    original_filename: &str,
    display_name: &str,
    bytes: &[u8],
) -> Result<UploadedSource> {
    if bytes.is_empty() || display_name.trim().is_empty() {
        let msg = "ignoring upload: file or name is empty";
        error!(filename = original_filename, name = display_name, "{msg}");
        return Err(GraphFeatError::Upload(msg.into()));
    }

    let file_name = Path::new(original_filename)
        .file_name()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            GraphFeatError::Upload(format!("invalid upload filename '{original_filename}'"))
        })?;

    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|e| GraphFeatError::Upload(format!("{}: {e}", uploads_dir.display())))?;

    let target = uploads_dir.join(file_name);
    tokio::fs::write(&target, bytes)
        .await
        .map_err(|e| GraphFeatError::Upload(format!("{}: {e}", target.display())))?;

    let path = tokio::fs::canonicalize(&target)
        .await
        .map_err(|e| GraphFeatError::Upload(format!("{}: {e}", target.display())))?;

    let address = Url::from_file_path(&path)
        .map_err(|()| {
            GraphFeatError::Upload(format!("{}: cannot express as file URI", path.display()))
        })?
        .to_string();

    info!(%address, name = display_name, bytes = bytes.len(), "upload stored");

    Ok(UploadedSource {
        address,
        name: display_name.to_string(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gf-upload-test-{}", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn stores_upload_and_returns_file_uri() {
        let dir = temp_dir();
        let uploaded = store_upload(&dir, "iris.ttl", "iris", b"<a> <b> <c> .")
            .await
            .unwrap();

        assert!(uploaded.address.starts_with("file://"));
        assert!(uploaded.address.ends_with("/iris.ttl"));
        assert_eq!(uploaded.name, "iris");
        assert_eq!(std::fs::read(&uploaded.path).unwrap(), b"<a> <b> <c> .");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn strips_directory_components() {
        let dir = temp_dir();
        let uploaded = store_upload(&dir, "../../escape.nt", "x", b"data")
            .await
            .unwrap();

        assert_eq!(uploaded.path.file_name().unwrap(), "escape.nt");
        assert!(uploaded.path.starts_with(std::fs::canonicalize(&dir).unwrap()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_empty_payload_or_name() {
        let dir = temp_dir();

        let err = store_upload(&dir, "iris.ttl", "iris", b"").await.unwrap_err();
        assert!(matches!(err, GraphFeatError::Upload(_)));

        let err = store_upload(&dir, "iris.ttl", "", b"data").await.unwrap_err();
        assert!(matches!(err, GraphFeatError::Upload(_)));

        assert!(!dir.join("iris.ttl").exists());
    }
}
