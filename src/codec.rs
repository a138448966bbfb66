use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;

use crate::error::ImageApiError;

pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes a base64 payload. A `data:<mime>;base64,` prefix and surrounding
/// whitespace are accepted.
pub fn from_base64(value: &str) -> Result<Vec<u8>, ImageApiError> {
    let payload = strip_data_url(value.trim());
    BASE64
        .decode(payload)
        .map_err(|err| ImageApiError::SourceDecode(err.to_string()))
}

fn strip_data_url(value: &str) -> &str {
    if !value.starts_with("data:") {
        return value;
    }
    match value.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => value,
    }
}

/// Decodes any supported image format into RGBA pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, ImageApiError> {
    if !infer::is_image(bytes) {
        let detected = infer::get(bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("unknown");
        return Err(ImageApiError::ImageDecode(format!(
            "payload is not an image (detected {})",
            detected
        )));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|err| ImageApiError::ImageDecode(err.to_string()))?;
    Ok(image.to_rgba8())
}

/// Drops the alpha channel when every pixel is fully opaque.
pub fn flatten(image: RgbaImage) -> DynamicImage {
    if image.pixels().all(|pixel| pixel.0[3] == u8::MAX) {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(image)
    }
}

/// Lossless PNG encoding of a flattened buffer.
pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>, ImageApiError> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    flatten(image)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|err| ImageApiError::Render(format!("failed to encode PNG: {}", err)))?;
    Ok(bytes)
}
