use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::storage::backends::BackendConfigs;

pub const DEFAULT_GENERAL_BREAKPOINTS: [u32; 7] = [320, 480, 768, 1024, 1280, 1600, 1920];
pub const DEFAULT_SQUARE_BREAKPOINTS: [u32; 7] = [16, 32, 64, 128, 256, 512, 1024];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_base_url")]
    /// The public prefix prepended to stored file names when
    /// building upload links. Expected to end with a `/`.
    pub base_url: String,

    #[serde(default)]
    /// Relaxed mode, upload token expiry is not enforced.
    ///
    /// Never enable this in production.
    pub debug: bool,

    #[serde(default = "default_fallback_image")]
    /// The image returned with a 404 whenever serving fails.
    pub fallback_image: PathBuf,

    #[serde(default = "default_allowed_extensions")]
    /// File extensions (without the leading dot) that may be served or uploaded.
    pub allowed_extensions: Vec<String>,

    #[serde(default)]
    pub breakpoints: BreakpointConfig,

    #[serde(default = "default_sources")]
    /// Where uploaded source images live.
    pub sources: BackendConfigs,

    #[serde(default = "default_cache")]
    /// Where generated variants are persisted.
    pub cache: BackendConfigs,

    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    /// The maximum number of variants that may be generated at once.
    ///
    /// If `None` there is no limit.
    pub max_concurrency: Option<usize>,

    #[serde(default = "default_true")]
    /// Collapse concurrent cache misses for the same variant into a
    /// single generation.
    pub deduplicate_generation: bool,
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The configuration written by `breakpoint init`.
    pub fn template() -> anyhow::Result<String> {
        let cfg: Self = serde_yaml::from_str("{}")?;
        Ok(serde_yaml::to_string(&cfg)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        check_sequence("general", &self.breakpoints.general)?;
        check_sequence("square", &self.breakpoints.square)?;

        if self.allowed_extensions.is_empty() {
            return Err(anyhow!("at least one allowed extension must be configured"));
        }

        for ext in self.allowed_extensions.iter() {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(anyhow!(
                    "allowed extension {:?} must be given without a leading dot",
                    ext
                ));
            }
        }

        if let Some(0) = self.max_concurrency {
            return Err(anyhow!("max_concurrency must be greater than 0 when set"));
        }

        if let Some(quality) = self.encoding.webp_quality {
            if !(0.0..=100.0).contains(&quality) {
                return Err(anyhow!("webp_quality must be between 0.0 and 100.0"));
            }
        }

        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }

        Ok(())
    }
}

fn check_sequence(name: &str, seq: &[u32]) -> anyhow::Result<()> {
    if seq.is_empty() {
        return Err(anyhow!("the {} breakpoint sequence must not be empty", name));
    }

    if seq[0] == 0 {
        return Err(anyhow!("the {} breakpoint sequence must not contain 0", name));
    }

    if seq.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(anyhow!(
            "the {} breakpoint sequence must be strictly increasing",
            name
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakpointConfig {
    #[serde(default = "default_general")]
    /// Widths used for any image whose aspect ratio is not exactly 1.
    pub general: Vec<u32>,

    #[serde(default = "default_square")]
    /// Widths used for square images.
    pub square: Vec<u32>,
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            square: default_square(),
        }
    }
}

#[derive(Debug, Copy, Clone, Deserialize, Serialize)]
pub struct EncodingConfig {
    #[serde(default = "default_webp_quality")]
    /// The ratio of lossy compression for webp images
    /// from 0.0 to 100.0 inclusive for minimal and maximal quality respectively.
    ///
    /// This can be set to null to put the encoder into lossless compression mode.
    pub webp_quality: Option<f32>,

    #[serde(default = "default_jpeg_quality")]
    /// JPEG quality from 1 to 100.
    pub jpeg_quality: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            webp_quality: default_webp_quality(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    /// Base64 encoded 32 byte key used to open upload tokens.
    ///
    /// Uploads are rejected while this is unset.
    pub key: Option<String>,
}

/// The encodable image formats.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ImageKind {
    #[strum(serialize = "jpeg", serialize = "jpg")]
    Jpeg,
    #[strum(serialize = "png")]
    Png,
    #[strum(serialize = "gif")]
    Gif,
    #[strum(serialize = "webp")]
    WebP,
}

impl ImageKind {
    /// Parses the kind from the extension of a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        ext.parse().ok()
    }

    /// Maps a sniffed codec format onto the encodable set.
    pub fn from_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl From<ImageKind> for image::ImageFormat {
    fn from(kind: ImageKind) -> Self {
        match kind {
            ImageKind::Jpeg => Self::Jpeg,
            ImageKind::Png => Self::Png,
            ImageKind::Gif => Self::Gif,
            ImageKind::WebP => Self::WebP,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    5000
}

fn default_base_url() -> String {
    "//127.0.0.1:5000/".to_string()
}

fn default_fallback_image() -> PathBuf {
    PathBuf::from("404.jpg")
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_general() -> Vec<u32> {
    DEFAULT_GENERAL_BREAKPOINTS.to_vec()
}

fn default_square() -> Vec<u32> {
    DEFAULT_SQUARE_BREAKPOINTS.to_vec()
}

fn default_sources() -> BackendConfigs {
    BackendConfigs::FileSystem {
        directory: PathBuf::from("files"),
    }
}

fn default_cache() -> BackendConfigs {
    BackendConfigs::FileSystem {
        directory: PathBuf::from("cache"),
    }
}

const fn default_webp_quality() -> Option<f32> {
    Some(80.0)
}

const fn default_jpeg_quality() -> u8 {
    75
}

const fn default_true() -> bool {
    true
}
