use std::num::IntErrorKind;
use std::path::Path;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use poem::http::StatusCode;

use crate::cache::{CacheStore, VariantBytes};
use crate::config::{ImageKind, RuntimeConfig};
use crate::error::ServeError;
use crate::utils;

pub mod inflight;
pub mod variant;

pub use variant::VariantGenerator;

/// What gets written back to the client for an image request.
#[derive(Debug, Clone)]
pub struct Served {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub data: Bytes,
}

/// The image returned whenever serving fails.
///
/// Loaded once at startup so a missing asset stops the server from
/// starting instead of failing requests later.
#[derive(Debug, Clone)]
pub struct Fallback {
    kind: ImageKind,
    data: Bytes,
}

impl Fallback {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let kind = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<ImageKind>().ok())
            .ok_or_else(|| anyhow!("fallback image {:?} has an unsupported extension", path))?;

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read fallback image {:?}", path))?;

        Ok(Self::new(kind, Bytes::from(data)))
    }

    pub fn new(kind: ImageKind, data: Bytes) -> Self {
        Self { kind, data }
    }
}

/// Resolves `GET /{filename}?w={width}` requests.
pub struct ImageServingPipeline {
    allowed_extensions: Vec<String>,
    cache: CacheStore,
    generator: VariantGenerator,
    fallback: Fallback,
}

impl ImageServingPipeline {
    pub fn new(
        cfg: &RuntimeConfig,
        cache: CacheStore,
        generator: VariantGenerator,
        fallback: Fallback,
    ) -> Self {
        Self {
            allowed_extensions: cfg.allowed_extensions.clone(),
            cache,
            generator,
            fallback,
        }
    }

    /// Serves the variant of `filename` for the raw `w` query value.
    ///
    /// Never fails, every error results in the fallback image with a 404.
    pub async fn serve(&self, filename: &str, requested_width: Option<&str>) -> Served {
        match self.resolve(filename, requested_width).await {
            Ok(variant) => Served {
                status: StatusCode::OK,
                content_type: variant.kind.as_content_type(),
                data: variant.data,
            },
            Err(e) if e.is_client_error() => {
                debug!(filename, error = %e, "serving fallback");
                self.fallback()
            },
            Err(e) => {
                warn!(filename, error = %e, "failed to produce variant, serving fallback");
                self.fallback()
            },
        }
    }

    pub fn fallback(&self) -> Served {
        Served {
            status: StatusCode::NOT_FOUND,
            content_type: self.fallback.kind.as_content_type(),
            data: self.fallback.data.clone(),
        }
    }

    async fn resolve(
        &self,
        filename: &str,
        requested_width: Option<&str>,
    ) -> Result<VariantBytes, ServeError> {
        let width = parse_width(requested_width)?;
        self.validate_name(filename)?;

        if let Some(variant) = self.cache.get_exact(width, filename).await? {
            debug!(filename, width, "cache hit");
            return Ok(variant);
        }

        let generated = self.generator.generate(filename, width).await?;
        if generated.breakpoint != width {
            debug!(filename, width, breakpoint = generated.breakpoint, "snapped to breakpoint");
        }

        Ok(generated.variant)
    }

    fn validate_name(&self, filename: &str) -> Result<(), ServeError> {
        if !utils::is_safe_file_name(filename) {
            return Err(ServeError::InvalidInput("unsafe file name"));
        }

        if !utils::has_allowed_extension(filename, &self.allowed_extensions) {
            return Err(ServeError::InvalidInput("file type is not allowed"));
        }

        Ok(())
    }
}

/// Parses the `w` query parameter, it must be an integer above 0.
///
/// Oversized widths saturate, they snap to the largest breakpoint like
/// any other request above it.
pub fn parse_width(raw: Option<&str>) -> Result<u32, ServeError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(ServeError::InvalidInput("missing width"))?;

    let width = match raw.parse::<i64>() {
        Ok(width) => width,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => i64::MAX,
        Err(_) => return Err(ServeError::InvalidInput("width is not an integer")),
    };

    if width <= 0 {
        return Err(ServeError::InvalidInput("width must be greater than 0"));
    }

    Ok(u32::try_from(width).unwrap_or(u32::MAX))
}
