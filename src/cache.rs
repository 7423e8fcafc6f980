use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::ImageKind;
use crate::storage::template::StorageBackend;

/// Identifies one stored variant of a source image.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct VariantKey {
    pub width: u32,
    pub source: String,
}

impl VariantKey {
    pub fn new(width: u32, source: impl Into<String>) -> Self {
        Self {
            width,
            source: source.into(),
        }
    }

    /// The name the variant is stored under, `{width}_{source}`.
    pub fn storage_name(&self) -> String {
        format!("{}_{}", self.width, self.source)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.width, self.source)
    }
}

/// An encoded image along with the format it was encoded in.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantBytes {
    pub kind: ImageKind,
    pub data: Bytes,
}

/// Persistent variant cache on top of a storage backend.
///
/// There is no eviction and no validation, if an entry exists it is
/// served as-is. This relies on source images never being replaced in
/// place.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn StorageBackend>,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Get a variant from the cache if it exists otherwise returns None.
    ///
    /// The declared format is sniffed from the stored bytes so it matches
    /// what the encoder wrote, the source file's extension is only used
    /// when the bytes are not recognised.
    pub async fn get(&self, key: &VariantKey) -> anyhow::Result<Option<VariantBytes>> {
        let data = match self.storage.fetch(&key.storage_name()).await? {
            Some(data) => data,
            None => return Ok(None),
        };

        let kind = image::guess_format(&data)
            .ok()
            .and_then(ImageKind::from_format)
            .or_else(|| ImageKind::from_file_name(&key.source));

        Ok(kind.map(|kind| VariantBytes { kind, data }))
    }

    /// Looks up the entry stored under the width exactly as requested,
    /// before it is snapped to a breakpoint.
    pub async fn get_exact(
        &self,
        requested_width: u32,
        source: &str,
    ) -> anyhow::Result<Option<VariantBytes>> {
        self.get(&VariantKey::new(requested_width, source)).await
    }

    pub async fn put(&self, key: &VariantKey, variant: &VariantBytes) -> anyhow::Result<()> {
        self.storage
            .store(&key.storage_name(), variant.data.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    use crate::processor::fixtures;
    use crate::storage::backends::MemoryBackend;

    #[test]
    fn storage_names() {
        assert_eq!(VariantKey::new(320, "a.jpg").storage_name(), "320_a.jpg");
        assert_eq!(VariantKey::new(16, "x_y.png").to_string(), "16_x_y.png");
    }

    #[tokio::test]
    async fn written_bytes_read_back_exactly() -> anyhow::Result<()> {
        let cache = CacheStore::new(Arc::new(MemoryBackend::default()));
        let key = VariantKey::new(480, "photo.png");

        assert!(cache.get(&key).await?.is_none());

        let variant = VariantBytes {
            kind: ImageKind::Png,
            data: Bytes::from_static(b"\x89PNG not really"),
        };
        cache.put(&key, &variant).await?;

        assert_eq!(cache.get(&key).await?, Some(variant));
        assert!(cache.get(&VariantKey::new(320, "photo.png")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn format_follows_the_stored_bytes() -> anyhow::Result<()> {
        let cache = CacheStore::new(Arc::new(MemoryBackend::default()));
        let key = VariantKey::new(480, "legacy.png");
        let data = Bytes::from(fixtures::encoded(48, 32, ImageFormat::WebP));
        cache
            .put(&key, &VariantBytes { kind: ImageKind::WebP, data: data.clone() })
            .await?;

        let found = cache.get(&key).await?.unwrap();
        assert_eq!(found.kind, ImageKind::WebP);
        assert_eq!(found.data, data);
        Ok(())
    }

    #[tokio::test]
    async fn unrecognised_bytes_fall_back_to_the_extension() -> anyhow::Result<()> {
        let cache = CacheStore::new(Arc::new(MemoryBackend::default()));
        let key = VariantKey::new(320, "photo.jpg");
        cache
            .put(&key, &VariantBytes { kind: ImageKind::Jpeg, data: Bytes::from_static(b"jpg") })
            .await?;

        let found = cache.get(&key).await?.unwrap();
        assert_eq!(found.kind, ImageKind::Jpeg);
        assert_eq!(found.kind.as_content_type(), "image/jpeg");
        Ok(())
    }
}
