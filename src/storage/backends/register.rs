use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FileSystemBackend, MemoryBackend};
use crate::storage::template::StorageBackend;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    FileSystem {
        directory: PathBuf,
    },

    /// Keeps everything in process memory, nothing survives a restart.
    Memory,
}

impl BackendConfigs {
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn StorageBackend>> {
        match self {
            Self::FileSystem { directory } => {
                let backend = FileSystemBackend::open(directory.clone()).await?;
                Ok(Arc::new(backend))
            },
            Self::Memory => Ok(Arc::new(MemoryBackend::default())),
        }
    }
}
