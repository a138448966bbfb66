use super::font::FontHandle;
use super::style::{Align, LayoutTuning, OverlayStyle, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct LineMetrics {
    pub text: String,
    pub width: u32,
    pub height: u32,
    /// Distance from the top of the line box to the baseline.
    pub baseline: i32,
    /// Offset from the block's left edge under the chosen alignment.
    pub x_offset: i32,
    /// Offset from the block's top edge.
    pub y_offset: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlockMetrics {
    pub lines: Vec<LineMetrics>,
    pub width: u32,
    pub height: u32,
    pub line_spacing: u32,
    pub font_size: u32,
    /// Top-left corner of the text block on the canvas.
    pub origin: Point,
}

impl TextBlockMetrics {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Top-left corner of line `index` on the canvas.
    pub fn line_origin(&self, index: usize) -> Option<Point> {
        let line = self.lines.get(index)?;
        Some(Point::new(
            self.origin.x.saturating_add(line.x_offset),
            self.origin.y.saturating_add(line.y_offset),
        ))
    }

    pub fn right(&self) -> i32 {
        self.origin.x.saturating_add_unsigned(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.origin.y.saturating_add_unsigned(self.height)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayoutEngine {
    tuning: LayoutTuning,
}

impl TextLayoutEngine {
    pub fn new(tuning: LayoutTuning) -> Self {
        Self { tuning }
    }

    pub fn for_style(style: &OverlayStyle) -> Self {
        Self::new(style.tuning())
    }

    /// Lays out `text` split on line breaks. The block is anchored against
    /// the canvas: `left` starts at `anchor.x`, `center` is centered on the
    /// canvas, `right` keeps `anchor.x` as the distance from the right edge.
    pub fn layout(
        &self,
        text: &str,
        font: &FontHandle,
        font_size: u32,
        anchor: Point,
        align: Align,
        canvas_width: u32,
    ) -> TextBlockMetrics {
        let line_spacing = self.tuning.line_spacing(font_size);
        if text.is_empty() {
            return TextBlockMetrics {
                lines: Vec::new(),
                width: 0,
                height: 0,
                line_spacing,
                font_size,
                origin: anchor,
            };
        }

        let size = font_size as f32;
        let ascent = font.ascent(size);
        let line_height = (ascent + font.descent(size)).round().max(0.0) as u32;
        let baseline = ascent.round() as i32;

        let mut lines: Vec<LineMetrics> = text
            .split('\n')
            .enumerate()
            .map(|(index, raw)| {
                let line = raw.strip_suffix('\r').unwrap_or(raw);
                LineMetrics {
                    text: line.to_string(),
                    width: font.measure(line, size).ceil().max(0.0) as u32,
                    height: line_height,
                    baseline,
                    x_offset: 0,
                    y_offset: (index as i64 * line_spacing as i64).min(i32::MAX as i64) as i32,
                }
            })
            .collect();

        let width = lines.iter().map(|line| line.width).max().unwrap_or(0);
        for line in &mut lines {
            line.x_offset = align_offset(align, width, line.width);
        }
        let height = (lines.len() as u32).saturating_mul(line_spacing);
        let origin = block_origin(align, anchor, width, canvas_width);

        TextBlockMetrics {
            lines,
            width,
            height,
            line_spacing,
            font_size,
            origin,
        }
    }

    pub fn layout_style(
        &self,
        style: &OverlayStyle,
        font: &FontHandle,
        canvas_width: u32,
    ) -> TextBlockMetrics {
        self.layout(
            style.text(),
            font,
            style.font_size(),
            style.position(),
            style.align(),
            canvas_width,
        )
    }
}

fn align_offset(align: Align, block_width: u32, line_width: u32) -> i32 {
    let slack = block_width.saturating_sub(line_width) as i32;
    match align {
        Align::Left => 0,
        Align::Center => slack / 2,
        Align::Right => slack,
    }
}

fn block_origin(align: Align, anchor: Point, block_width: u32, canvas_width: u32) -> Point {
    let slack = canvas_width as i64 - block_width as i64;
    let x = match align {
        Align::Left => anchor.x as i64,
        Align::Center => slack / 2,
        Align::Right => slack - anchor.x as i64,
    };
    Point::new(x.clamp(i32::MIN as i64, i32::MAX as i64) as i32, anchor.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TextLayoutEngine {
        TextLayoutEngine::default()
    }

    #[test]
    fn line_breaks_stack_lines_by_the_rounded_spacing() {
        let metrics = engine().layout(
            "A\nB",
            &FontHandle::Bitmap,
            40,
            Point::new(0, 0),
            Align::Left,
            400,
        );
        assert_eq!(metrics.lines.len(), 2);
        assert_eq!(metrics.line_spacing, 48);
        let first = metrics.line_origin(0).unwrap();
        let second = metrics.line_origin(1).unwrap();
        assert_eq!(first, Point::new(0, 0));
        assert_eq!(second.y - first.y, 48);
        assert_eq!(metrics.height, 96);
    }

    #[test]
    fn block_width_is_the_widest_line() {
        let metrics = engine().layout(
            "AB\nABCD\nA",
            &FontHandle::Bitmap,
            40,
            Point::new(5, 7),
            Align::Left,
            1000,
        );
        let widths: Vec<u32> = metrics.lines.iter().map(|line| line.width).collect();
        assert_eq!(widths, vec![60, 120, 30]);
        assert_eq!(metrics.width, 120);
        assert_eq!(metrics.origin, Point::new(5, 7));
    }

    #[test]
    fn center_alignment_splits_the_slack() {
        for text in ["A", "ABC", "ABCDEFG"] {
            let metrics = engine().layout(
                text,
                &FontHandle::Bitmap,
                40,
                Point::new(0, 10),
                Align::Center,
                640,
            );
            let line = &metrics.lines[0];
            assert_eq!(line.x_offset, 0, "single line fills its own block");
            let draw_x = metrics.line_origin(0).unwrap().x;
            assert_eq!(draw_x, (640 - line.width as i32) / 2, "text {}", text);
        }

        let metrics = engine().layout(
            "ABCDEFG\nA\nABC",
            &FontHandle::Bitmap,
            40,
            Point::default(),
            Align::Center,
            640,
        );
        for line in &metrics.lines {
            assert_eq!(line.x_offset, (metrics.width as i32 - line.width as i32) / 2);
        }
    }

    #[test]
    fn right_alignment_measures_from_the_right_edge() {
        let metrics = engine().layout(
            "AB\nABCD",
            &FontHandle::Bitmap,
            40,
            Point::new(20, 0),
            Align::Right,
            500,
        );
        assert_eq!(metrics.origin.x, 500 - 120 - 20);
        assert_eq!(metrics.lines[0].x_offset, 60);
        assert_eq!(metrics.lines[1].x_offset, 0);
        assert_eq!(metrics.right(), 480);
    }

    #[test]
    fn empty_text_is_a_zero_block_at_the_anchor() {
        let metrics = engine().layout(
            "",
            &FontHandle::Bitmap,
            40,
            Point::new(12, 34),
            Align::Center,
            300,
        );
        assert!(metrics.is_empty());
        assert_eq!((metrics.width, metrics.height), (0, 0));
        assert_eq!(metrics.origin, Point::new(12, 34));
    }

    #[test]
    fn carriage_returns_are_not_measured() {
        let metrics = engine().layout(
            "AB\r\nC",
            &FontHandle::Bitmap,
            40,
            Point::default(),
            Align::Left,
            300,
        );
        assert_eq!(metrics.lines[0].text, "AB");
        assert_eq!(metrics.lines[0].width, 60);
    }

    #[test]
    fn extreme_anchors_saturate_instead_of_wrapping() {
        let metrics = engine().layout(
            "A\nB",
            &FontHandle::Bitmap,
            40,
            Point::new(i32::MIN, i32::MAX - 10),
            Align::Right,
            400,
        );
        assert_eq!(metrics.origin.x, i32::MAX);
        assert_eq!(metrics.line_origin(1).unwrap().y, i32::MAX);
        assert_eq!(metrics.right(), i32::MAX);
        assert_eq!(metrics.bottom(), i32::MAX);
    }
}
