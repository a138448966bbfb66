mod bitmap;
mod font;
mod layout;
mod render;
mod style;

use image::RgbaImage;
use tracing::debug;

use crate::codec;
use crate::error::ImageApiError;

pub use font::{FontFile, FontHandle, FontProvider, FontResolver, SystemFamily, load_font_file};
pub use layout::{LineMetrics, TextBlockMetrics, TextLayoutEngine};
pub use render::{OverlayCompositor, PanelRect, panel_rect};
pub use style::{
    Align, BackgroundPanel, DEFAULT_BORDER_RADIUS, DEFAULT_FONT_SIZE, DEFAULT_OPACITY,
    DEFAULT_PADDING, DEFAULT_PANEL_COLOR, DEFAULT_TEXT_COLOR, LayoutTuning, OverlayStyle,
    OverlayStyleBuilder, Point, Rgb,
};

/// Font resolution, layout and compositing for one overlay.
pub fn render_overlay(
    image: &RgbaImage,
    style: &OverlayStyle,
    fonts: &FontResolver,
) -> Result<RgbaImage, ImageApiError> {
    let font = fonts.resolve(style.font_path());
    let metrics = TextLayoutEngine::for_style(style).layout_style(style, &font, image.width());
    debug!(
        "laid out {} line(s): {}x{} at ({}, {})",
        metrics.lines.len(),
        metrics.width,
        metrics.height,
        metrics.origin.x,
        metrics.origin.y
    );
    OverlayCompositor::new(font).render(image, style, &metrics)
}

/// [`render_overlay`] followed by PNG encoding.
pub fn render_overlay_png(
    image: &RgbaImage,
    style: &OverlayStyle,
    fonts: &FontResolver,
) -> Result<Vec<u8>, ImageApiError> {
    codec::encode_png(render_overlay(image, style, fonts)?)
}
