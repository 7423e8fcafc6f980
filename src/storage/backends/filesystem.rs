use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::template::StorageBackend;

/// Stores every entry as a file directly inside `directory`.
pub struct FileSystemBackend {
    directory: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileSystemBackend {
    pub async fn open(directory: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("failed to create storage directory {:?}", &directory))?;

        Ok(Self {
            directory,
            tmp_counter: AtomicU64::new(0),
        })
    }

    #[inline]
    fn format_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// A scratch path next to the target.
    ///
    /// The leading dot keeps it outside the set of servable names.
    fn format_tmp_path(&self, name: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.directory
            .join(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn store(&self, name: &str, data: Bytes) -> anyhow::Result<()> {
        let path = self.format_path(name);
        let tmp = self.format_tmp_path(name);

        debug!("Storing image @ {:?}", &path);
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }

            // The directory was removed from under us.
            tokio::fs::create_dir_all(&self.directory).await?;
            tokio::fs::write(&tmp, &data).await?;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn fetch(&self, name: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.format_path(name);

        debug!("Retrieving image @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        match tokio::fs::metadata(self.format_path(name)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(other) => Err(other.into()),
        }
    }
}
