use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, ImageResult};

pub mod encoder;
pub mod resizer;

/// Reads only the header of an encoded image to get its dimensions.
pub fn read_dimensions(data: &[u8]) -> ImageResult<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .into_dimensions()
}

/// Fully decodes an image, returning it with the format sniffed from its content.
pub fn decode(data: &[u8]) -> ImageResult<(DynamicImage, ImageFormat)> {
    let format = image::guess_format(data)?;
    let img = image::load_from_memory_with_format(data, format)?;
    Ok((img, format))
}

/// Runs CPU heavy work on the rayon pool and waits for it without
/// blocking the runtime.
pub async fn run_blocking<F, T>(work: F) -> anyhow::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();

    rayon::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(work));
        let _ = tx.send(result);
    });

    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(anyhow!("image processing task panicked")),
        Err(_) => Err(anyhow!("image processing task was dropped before completing")),
    }
}
