use image::DynamicImage;

/// The bounding box a variant at `breakpoint` must fit in.
///
/// The height is rounded down and never reaches 0, even for extremely
/// wide sources.
pub fn target_dimensions(breakpoint: u32, aspect_ratio: f64) -> (u32, u32) {
    let height = (breakpoint as f64 / aspect_ratio).floor();
    (breakpoint, (height as u32).max(1))
}

/// Shrinks `img` to fit inside `width`x`height` keeping its aspect ratio.
///
/// Images that already fit are returned untouched, this never upscales.
pub fn fit_within(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() <= width && img.height() <= height {
        return img;
    }

    img.thumbnail(width, height)
}
