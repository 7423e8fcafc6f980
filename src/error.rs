use poem::http::StatusCode;
use thiserror::Error;

/// Why a variant could not be served.
///
/// Every variant collapses into the same fallback response, the
/// distinction only exists for logging and tests.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid request: {0}")]
    InvalidInput(&'static str),

    #[error("source image {0:?} does not exist")]
    NotFound(String),

    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode variant: {0}")]
    Encode(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ServeError {
    /// Client mistakes as opposed to something going wrong on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("upload token has expired")]
    Unauthorized,

    #[error("invalid file: {0}")]
    InvalidFile(&'static str),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl UploadError {
    /// Only an expired token is reported as such, everything else is a 400.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
