use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::auth::TokenVerifier;
use crate::breakpoints::Breakpoints;
use crate::config::{ImageKind, RuntimeConfig};
use crate::error::UploadError;
use crate::processor;
use crate::storage::template::StorageBackend;
use crate::utils;

const NAME_ATTEMPTS: usize = 3;

/// The `file` field of an upload request.
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// Returned to the client after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDescriptor {
    /// Where the new image can be requested from.
    pub link: String,

    /// The breakpoint widths available for the image.
    pub sizes: Vec<u32>,
}

/// Admits new source images.
pub struct UploadAdmitter {
    sources: Arc<dyn StorageBackend>,
    verifier: Arc<dyn TokenVerifier>,
    breakpoints: Breakpoints,
    allowed_extensions: Vec<String>,
    base_url: String,
    enforce_expiry: bool,
}

impl UploadAdmitter {
    pub fn new(
        cfg: &RuntimeConfig,
        sources: Arc<dyn StorageBackend>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            sources,
            verifier,
            breakpoints: Breakpoints::new(&cfg.breakpoints),
            allowed_extensions: cfg.allowed_extensions.clone(),
            base_url: cfg.base_url.clone(),
            enforce_expiry: !cfg.debug,
        }
    }

    pub async fn admit(
        &self,
        file: Option<UploadedFile>,
        token: Option<&str>,
    ) -> Result<UploadDescriptor, UploadError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(UploadError::BadRequest("missing upload token"))?;

        let payload = self
            .verifier
            .verify(token)
            .ok_or(UploadError::BadRequest("upload token could not be verified"))?;

        if self.enforce_expiry && payload.expires_in <= utils::now_epoch_secs() {
            return Err(UploadError::Unauthorized);
        }

        let file = file.ok_or(UploadError::BadRequest("missing file field"))?;
        let original_name = file.file_name.unwrap_or_default();
        if !utils::has_allowed_extension(&original_name, &self.allowed_extensions) {
            return Err(UploadError::InvalidFile("file type is not allowed"));
        }

        let safe_name = utils::secure_filename(&original_name);
        let ext = utils::extension_of(&safe_name)
            .filter(|_| utils::has_allowed_extension(&safe_name, &self.allowed_extensions))
            .ok_or(UploadError::InvalidFile("file name has no usable extension"))?;

        // The stored name keeps this extension, its format must match the bytes.
        let declared = ext.parse::<ImageKind>().ok();
        let sniffed = image::guess_format(&file.data).ok().and_then(ImageKind::from_format);
        if declared.is_none() || declared != sniffed {
            return Err(UploadError::InvalidFile("file contents do not match its extension"));
        }

        let (width, _) = processor::read_dimensions(&file.data)
            .map_err(|_| UploadError::InvalidFile("file is not a readable image"))?;

        let stored_name = self.unused_name(&safe_name, &ext).await?;
        self.sources.store(&stored_name, file.data).await?;

        info!(
            original = %original_name,
            stored = %stored_name,
            width,
            "admitted new source image"
        );

        Ok(UploadDescriptor {
            link: format!("{}{}", self.base_url, stored_name),
            sizes: self.breakpoints.sizes_up_to(width),
        })
    }

    /// Sources are never replaced, a name that is already taken is
    /// derived again from a fresh timestamp.
    async fn unused_name(&self, safe_name: &str, ext: &str) -> Result<String, UploadError> {
        for _ in 0..NAME_ATTEMPTS {
            let name = derive_name(safe_name, &utils::high_resolution_timestamp(), ext);
            if !self.sources.exists(&name).await? {
                return Ok(name);
            }

            warn!(name = %name, "derived upload name is already taken");
        }

        Err(UploadError::Storage(anyhow!(
            "no unused name for {:?} after {} attempts",
            safe_name,
            NAME_ATTEMPTS
        )))
    }
}

/// `hex(sha512(safe_name ++ timestamp)).ext`
pub fn derive_name(safe_name: &str, timestamp: &str, ext: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(safe_name.as_bytes());
    hasher.update(timestamp.as_bytes());
    format!("{}.{}", hex::encode(hasher.finalize()), ext)
}
