use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;

use crate::services::files::write_atomic;

const THUMBNAIL_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub(crate) enum ThumbnailError {
    #[error("image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    #[error("thumbnail could not be encoded: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to write thumbnail: {0}")]
    Io(#[from] std::io::Error),
    #[error("thumbnail worker failed: {0}")]
    Join(String),
}

/// Decodes `bytes` and re-encodes them as a JPEG that fits inside a
/// `max_dimension` square, keeping the aspect ratio. Smaller images keep their size.
pub(crate) fn render_thumbnail(bytes: &[u8], max_dimension: u32) -> Result<Vec<u8>, ThumbnailError> {
    let image = image::load_from_memory(bytes).map_err(ThumbnailError::Decode)?;

    let image = if image.width() > max_dimension || image.height() > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, THUMBNAIL_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ThumbnailError::Encode)?;

    Ok(encoded)
}

pub(crate) async fn write_thumbnail(
    source: Vec<u8>,
    target: &Path,
    max_dimension: u32,
) -> Result<(), ThumbnailError> {
    let encoded = tokio::task::spawn_blocking(move || render_thumbnail(&source, max_dimension))
        .await
        .map_err(|err| ThumbnailError::Join(err.to_string()))??;

    write_atomic(target, &encoded).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let buffer = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
