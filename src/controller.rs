use std::sync::Arc;

use crate::auth::{RejectAll, SealedTokenVerifier, TokenVerifier};
use crate::cache::CacheStore;
use crate::config::RuntimeConfig;
use crate::pipelines::{Fallback, ImageServingPipeline, VariantGenerator};
use crate::storage::template::StorageBackend;
use crate::upload::UploadAdmitter;

/// Everything a request handler needs, built once at startup.
pub struct Controller {
    pipeline: ImageServingPipeline,
    admitter: UploadAdmitter,
}

impl Controller {
    pub async fn from_config(cfg: &RuntimeConfig) -> anyhow::Result<Self> {
        let sources = cfg.sources.connect().await?;
        let cache = CacheStore::new(cfg.cache.connect().await?);
        let fallback = Fallback::load(&cfg.fallback_image).await?;

        let verifier: Arc<dyn TokenVerifier> = match cfg.auth.key.as_deref() {
            Some(key) => Arc::new(SealedTokenVerifier::from_base64_key(key)?),
            None => {
                warn!("No upload key configured, all uploads will be rejected.");
                Arc::new(RejectAll)
            },
        };

        Ok(Self::new(cfg, sources, cache, fallback, verifier))
    }

    pub fn new(
        cfg: &RuntimeConfig,
        sources: Arc<dyn StorageBackend>,
        cache: CacheStore,
        fallback: Fallback,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let generator = VariantGenerator::new(cfg, sources.clone(), cache.clone());
        let pipeline = ImageServingPipeline::new(cfg, cache, generator, fallback);
        let admitter = UploadAdmitter::new(cfg, sources, verifier);

        Self { pipeline, admitter }
    }

    #[inline]
    pub fn pipeline(&self) -> &ImageServingPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn admitter(&self) -> &UploadAdmitter {
        &self.admitter
    }
}
