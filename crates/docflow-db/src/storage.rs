//! Filesystem object storage backend.
//!
//! Stores blobs in a directory hierarchy keyed by UUIDv7 storage ids.
//! Path format: `{base_path}/blobs/{first-2-hex}/{next-2-hex}/{uuid}`.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use docflow_core::{new_v7, Error, ObjectStorage, Result};

/// Filesystem implementation of [`ObjectStorage`].
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Create a new filesystem backend rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn blob_path(&self, storage_id: &str) -> Result<PathBuf> {
        // Storage ids are UUID strings; reject anything else so a crafted
        // id can never traverse out of the blob root.
        let id: uuid::Uuid = storage_id
            .parse()
            .map_err(|_| Error::Storage(format!("invalid storage id: {}", storage_id)))?;
        let hex = id.simple().to_string();
        Ok(self
            .base_path
            .join("blobs")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn upload(&self, file_name: &str, _content_type: &str, data: &[u8]) -> Result<String> {
        let storage_id = new_v7().to_string();
        let path = self.blob_path(&storage_id)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp name then rename for atomicity.
        let tmp = path.with_extension("tmp");
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(data).await?;
        f.sync_all().await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            subsystem = "db",
            component = "storage",
            op = "upload",
            storage_id = %storage_id,
            file_name,
            bytes = data.len(),
            "Stored blob"
        );
        Ok(storage_id)
    }

    async fn resolve_url(&self, storage_id: &str) -> Result<String> {
        let path = self.blob_path(storage_id)?;
        if !fs::try_exists(&path).await? {
            return Err(Error::Storage(format!("no blob for id {}", storage_id)));
        }
        Ok(format!("file://{}", path.display()))
    }
}
