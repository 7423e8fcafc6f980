use async_trait::async_trait;
use bytes::Bytes;

/// A flat key-value byte store.
///
/// Names are validated file names (see `utils::is_safe_file_name`), backends
/// do not need to handle nested paths.
#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// Stores `data` under `name`, replacing any existing entry.
    ///
    /// Readers must never observe a partially written entry.
    async fn store(&self, name: &str, data: Bytes) -> anyhow::Result<()>;

    async fn fetch(&self, name: &str) -> anyhow::Result<Option<Bytes>>;

    async fn exists(&self, name: &str) -> anyhow::Result<bool>;
}
