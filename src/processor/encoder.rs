use std::io::Cursor;

use anyhow::anyhow;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};

use crate::config::{EncodingConfig, ImageKind};

/// The format a variant is written in.
///
/// Sources already in an encodable format keep it, anything else
/// (bmp, tiff, ...) becomes webp.
pub fn output_kind(source: ImageFormat) -> ImageKind {
    ImageKind::from_format(source).unwrap_or(ImageKind::WebP)
}

/// Encodes `img` as `kind`, trading encode time for smaller output.
pub fn encode_to(
    cfg: &EncodingConfig,
    img: &DynamicImage,
    kind: ImageKind,
) -> anyhow::Result<Bytes> {
    let mut buff = Vec::new();

    match kind {
        ImageKind::WebP => return encode_webp(cfg, img),
        ImageKind::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buff, cfg.jpeg_quality))?;
        },
        ImageKind::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buff,
                CompressionType::Best,
                FilterType::Adaptive,
            );
            img.write_with_encoder(encoder)?;
        },
        ImageKind::Gif => {
            let mut cursor = Cursor::new(buff);
            img.write_to(&mut cursor, ImageFormat::Gif)?;
            buff = cursor.into_inner();
        },
    }

    Ok(Bytes::from(buff))
}

fn encode_webp(cfg: &EncodingConfig, img: &DynamicImage) -> anyhow::Result<Bytes> {
    // The webp encoder only accepts 8 bit RGB(A) layouts.
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let encoder = webp::Encoder::from_image(&img)
        .map_err(|e| anyhow!("unsupported webp layout: {}", e))?;

    let encoded = match cfg.webp_quality {
        Some(quality) => encoder.encode(quality),
        None => encoder.encode_lossless(),
    };

    Ok(Bytes::from(encoded.to_vec()))
}
