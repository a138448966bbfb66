use image::{Rgba, RgbaImage};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};
use tracing::debug;

use super::font::FontHandle;
use super::layout::TextBlockMetrics;
use super::style::{OverlayStyle, Rgb};
use crate::error::ImageApiError;

/// Offsets each line is drawn at to thicken the strokes.
const BOLD_OFFSETS: [(f32, f32); 5] = [
    (0.0, 0.0),
    (-1.0, 0.0),
    (1.0, 0.0),
    (0.0, -1.0),
    (0.0, 1.0),
];

/// Coordinates handed to the rasterizer are kept within this distance of
/// the canvas origin. Anything further out is off-canvas either way.
const COORD_LIMIT: i32 = 1 << 24;

/// Control point distance for a quarter circle drawn with one cubic.
const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub radius: f32,
}

impl PanelRect {
    pub fn right(&self) -> i32 {
        self.x.saturating_add_unsigned(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add_unsigned(self.height)
    }
}

/// Background panel geometry: the text block grown by `padding` on every
/// side plus an extra strip at the bottom. The corner radius is clamped to
/// half the shorter side.
pub fn panel_rect(style: &OverlayStyle, metrics: &TextBlockMetrics) -> Option<PanelRect> {
    style.background()?;
    if metrics.is_empty() {
        return None;
    }
    let padding = style.padding();
    let extra = style.tuning().panel_bottom_extra(style.font_size());
    let width = metrics.width + padding * 2;
    let height = metrics.height + padding * 2 + extra;
    let radius = (style.border_radius() as f32).min(width.min(height) as f32 / 2.0);
    Some(PanelRect {
        x: metrics.origin.x.saturating_sub_unsigned(padding),
        y: metrics.origin.y.saturating_sub_unsigned(padding),
        width,
        height,
        radius,
    })
}

/// Draws a laid-out text block (and its optional panel) over an image.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    font: FontHandle,
}

impl OverlayCompositor {
    pub fn new(font: FontHandle) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &FontHandle {
        &self.font
    }

    /// Returns a new buffer; `image` is left untouched.
    pub fn render(
        &self,
        image: &RgbaImage,
        style: &OverlayStyle,
        metrics: &TextBlockMetrics,
    ) -> Result<RgbaImage, ImageApiError> {
        let (width, height) = image.dimensions();
        let mut output = image.clone();
        if metrics.is_empty() {
            return Ok(output);
        }

        let panel = match (panel_rect(style, metrics), style.background()) {
            (Some(rect), Some(background)) => {
                Some((panel_coverage(width, height, &rect)?, background))
            }
            _ => None,
        };
        let text = self.text_coverage(width, height, metrics)?;
        debug!(
            "compositing {} line(s) with {} onto {}x{}",
            metrics.lines.len(),
            self.font.name(),
            width,
            height
        );

        let text_pixels = text.pixels();
        for (index, pixel) in output.pixels_mut().enumerate() {
            let mut layer = Rgba([0, 0, 0, 0]);
            if let Some((coverage, background)) = panel.as_ref() {
                let alpha = scaled_alpha(coverage.pixels()[index].alpha(), background.opacity);
                if alpha > 0 {
                    layer = blend_over(layer, with_alpha(background.color, alpha));
                }
            }
            let alpha = scaled_alpha(text_pixels[index].alpha(), style.opacity());
            if alpha > 0 {
                layer = blend_over(layer, with_alpha(style.color(), alpha));
            }
            if layer.0[3] > 0 {
                *pixel = blend_over(*pixel, layer);
            }
        }
        Ok(output)
    }

    /// Glyph coverage of every line, drawn once per bold offset. Later
    /// passes accumulate with source-over so overlapping strokes never lose
    /// coverage.
    fn text_coverage(
        &self,
        width: u32,
        height: u32,
        metrics: &TextBlockMetrics,
    ) -> Result<Pixmap, ImageApiError> {
        let mut canvas = coverage_canvas(width, height)?;
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        paint.anti_alias = self.font.anti_alias();
        let font_size = metrics.font_size as f32;

        for (index, line) in metrics.lines.iter().enumerate() {
            let Some(origin) = metrics.line_origin(index) else {
                continue;
            };
            let baseline = canvas_coord(origin.y.saturating_add(line.baseline));
            let Some(path) = self
                .font
                .line_path(&line.text, font_size, canvas_coord(origin.x), baseline)
            else {
                continue;
            };
            for (dx, dy) in BOLD_OFFSETS {
                canvas.fill_path(
                    &path,
                    &paint,
                    FillRule::Winding,
                    Transform::from_translate(dx, dy),
                    None,
                );
            }
        }
        Ok(canvas)
    }
}

fn coverage_canvas(width: u32, height: u32) -> Result<Pixmap, ImageApiError> {
    Pixmap::new(width, height).ok_or_else(|| {
        ImageApiError::Render(format!("cannot allocate a {}x{} canvas", width, height))
    })
}

fn panel_coverage(width: u32, height: u32, rect: &PanelRect) -> Result<Pixmap, ImageApiError> {
    let mut canvas = coverage_canvas(width, height)?;
    let Some(path) = rounded_rect_path(rect) else {
        return Ok(canvas);
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    // Square panels are pixel aligned.
    paint.anti_alias = rect.radius > 0.0;
    canvas.fill_path(
        &path,
        &paint,
        FillRule::Winding,
        Transform::identity(),
        None,
    );
    Ok(canvas)
}

fn rounded_rect_path(rect: &PanelRect) -> Option<tiny_skia::Path> {
    let x = canvas_coord(rect.x);
    let y = canvas_coord(rect.y);
    let w = rect.width as f32;
    let h = rect.height as f32;
    let r = rect.radius;
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(Rect::from_xywh(x, y, w, h)?));
    }
    let k = r * KAPPA;
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn canvas_coord(value: i32) -> f32 {
    value.clamp(-COORD_LIMIT, COORD_LIMIT) as f32
}

fn scaled_alpha(coverage: u8, opacity: f32) -> u8 {
    (coverage as f32 * opacity).round().clamp(0.0, 255.0) as u8
}

fn with_alpha(color: Rgb, alpha: u8) -> Rgba<u8> {
    Rgba([color.0, color.1, color.2, alpha])
}

/// Straight-alpha source-over.
pub(crate) fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src.0[3] as f32 / 255.0;
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let value =
            (src.0[channel] as f32 * sa + dst.0[channel] as f32 * da * (1.0 - sa)) / out_a;
        out[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
