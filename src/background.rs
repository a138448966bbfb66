use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::info;

use crate::codec;

pub const GENERATED_SIZE: u32 = 1024;

const TOP: [u8; 3] = [24, 32, 56];
const BOTTOM: [u8; 3] = [88, 112, 160];

/// Encoded bytes of the background used when a generation prompt is empty.
/// A configured file is returned verbatim after checking that it decodes.
pub fn load_default_background(path: Option<&str>) -> Result<Vec<u8>> {
    let Some(path) = path.map(str::trim).filter(|path| !path.is_empty()) else {
        return generated_background();
    };
    let path = Path::new(path);
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read default background: {}", path.display()))?;
    codec::decode(&bytes)
        .with_context(|| format!("default background is not an image: {}", path.display()))?;
    info!("default background: {}", path.display());
    Ok(bytes)
}

/// A vertical gradient, encoded as an opaque PNG.
pub fn generated_background() -> Result<Vec<u8>> {
    let span = (GENERATED_SIZE - 1).max(1) as f32;
    let image = RgbaImage::from_fn(GENERATED_SIZE, GENERATED_SIZE, |_, y| {
        let t = y as f32 / span;
        let mix = |from: u8, to: u8| (from as f32 + (to as f32 - from as f32) * t).round() as u8;
        Rgba([
            mix(TOP[0], BOTTOM[0]),
            mix(TOP[1], BOTTOM[1]),
            mix(TOP[2], BOTTOM[2]),
            255,
        ])
    });
    Ok(codec::encode_png(image)?)
}
