use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::breakpoints::Breakpoints;
use crate::cache::{CacheStore, VariantBytes, VariantKey};
use crate::config::{EncodingConfig, RuntimeConfig};
use crate::error::ServeError;
use crate::pipelines::inflight::InFlight;
use crate::processor::{self, encoder, resizer};
use crate::storage::template::StorageBackend;

pub struct Generated {
    pub variant: VariantBytes,

    /// The breakpoint the requested width was snapped to.
    pub breakpoint: u32,
}

/// Renders breakpoint variants of source images into the cache.
pub struct VariantGenerator {
    sources: Arc<dyn StorageBackend>,
    cache: CacheStore,
    breakpoints: Breakpoints,
    encoding: EncodingConfig,
    limiter: Option<Semaphore>,
    inflight: Option<InFlight>,
}

impl VariantGenerator {
    pub fn new(cfg: &RuntimeConfig, sources: Arc<dyn StorageBackend>, cache: CacheStore) -> Self {
        Self {
            sources,
            cache,
            breakpoints: Breakpoints::new(&cfg.breakpoints),
            encoding: cfg.encoding,
            limiter: cfg.max_concurrency.map(Semaphore::new),
            inflight: cfg.deduplicate_generation.then(InFlight::default),
        }
    }

    /// Produces the variant of `source` used for `requested_width`.
    ///
    /// The variant is stored under the selected breakpoint rather than
    /// the requested width, so every width that snaps to the same
    /// breakpoint shares one entry. An existing entry is reused without
    /// decoding the full source.
    pub async fn generate(
        &self,
        source: &str,
        requested_width: u32,
    ) -> Result<Generated, ServeError> {
        let data = self
            .sources
            .fetch(source)
            .await?
            .ok_or_else(|| ServeError::NotFound(source.to_string()))?;

        let (width, height) = processor::read_dimensions(&data)?;
        if width == 0 || height == 0 {
            return Err(ServeError::InvalidInput("source image has no pixels"));
        }

        let aspect_ratio = width as f64 / height as f64;
        let breakpoint = self.breakpoints.select(requested_width, aspect_ratio);
        let key = VariantKey::new(breakpoint, source);

        // Concurrent misses for the same key wait here and then find the
        // leader's result in the cache.
        let _guard = match self.inflight.as_ref() {
            Some(table) => Some(table.acquire(&key).await),
            None => None,
        };

        if let Some(variant) = self.cache.get(&key).await? {
            debug!(key = %key, "reusing stored variant");
            return Ok(Generated { variant, breakpoint });
        }

        let _permit = match self.limiter.as_ref() {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        let start = Instant::now();
        let encoding = self.encoding;
        let variant =
            processor::run_blocking(move || render(&data, breakpoint, aspect_ratio, &encoding))
                .await
                .map_err(|e| ServeError::Encode(format!("{:#}", e)))??;

        self.cache.put(&key, &variant).await?;

        info!(
            key = %key,
            requested_width,
            format = ?variant.kind,
            bytes = variant.data.len(),
            elapsed = ?start.elapsed(),
            "generated variant"
        );

        Ok(Generated { variant, breakpoint })
    }
}

fn render(
    data: &[u8],
    breakpoint: u32,
    aspect_ratio: f64,
    cfg: &EncodingConfig,
) -> Result<VariantBytes, ServeError> {
    let (img, format) = processor::decode(data)?;

    let (width, height) = resizer::target_dimensions(breakpoint, aspect_ratio);
    let resized = resizer::fit_within(img, width, height);

    let kind = encoder::output_kind(format);
    let data = encoder::encode_to(cfg, &resized, kind)
        .map_err(|e| ServeError::Encode(format!("{:#}", e)))?;

    Ok(VariantBytes { kind, data })
}
