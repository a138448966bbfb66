use serde::Deserialize;
use std::str::FromStr;

use crate::error::ImageApiError;

pub const MIN_FONT_SIZE: u32 = 10;
pub const MAX_FONT_SIZE: u32 = 200;
pub const MAX_PADDING: u32 = 128;
pub const MAX_BORDER_RADIUS: u32 = 128;

pub const DEFAULT_FONT_SIZE: u32 = 60;
pub const DEFAULT_OPACITY: f32 = 0.8;
pub const DEFAULT_PADDING: u32 = 16;
pub const DEFAULT_BORDER_RADIUS: u32 = 12;
pub const DEFAULT_TEXT_COLOR: Rgb = Rgb(255, 255, 255);
pub const DEFAULT_PANEL_COLOR: Rgb = Rgb(255, 255, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl Align {
    pub fn as_str(&self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }
}

impl FromStr for Align {
    type Err = ImageApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Align::Left),
            "center" => Ok(Align::Center),
            "right" => Ok(Align::Right),
            other => Err(ImageApiError::validation(format!(
                "align must be one of left, center, right (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Cosmetic ratios applied relative to the font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutTuning {
    pub line_spacing_ratio: f32,
    pub panel_bottom_ratio: f32,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            line_spacing_ratio: 1.2,
            panel_bottom_ratio: 0.4,
        }
    }
}

impl LayoutTuning {
    pub fn line_spacing(&self, font_size: u32) -> u32 {
        (font_size as f32 * self.line_spacing_ratio).round().max(0.0) as u32
    }

    pub fn panel_bottom_extra(&self, font_size: u32) -> u32 {
        (font_size as f32 * self.panel_bottom_ratio).round().max(0.0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundPanel {
    pub color: Rgb,
    pub opacity: f32,
}

/// A validated overlay description. Built through [`OverlayStyleBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    text: String,
    font_size: u32,
    font_path: Option<String>,
    position: Point,
    color: Rgb,
    opacity: f32,
    align: Align,
    background: Option<BackgroundPanel>,
    padding: u32,
    border_radius: u32,
    tuning: LayoutTuning,
}

impl OverlayStyle {
    pub fn builder(text: impl Into<String>) -> OverlayStyleBuilder {
        OverlayStyleBuilder::new(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn font_path(&self) -> Option<&str> {
        self.font_path.as_deref()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn align(&self) -> Align {
        self.align
    }

    pub fn background(&self) -> Option<&BackgroundPanel> {
        self.background.as_ref()
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    pub fn border_radius(&self) -> u32 {
        self.border_radius
    }

    pub fn tuning(&self) -> LayoutTuning {
        self.tuning
    }
}

#[derive(Debug, Clone)]
pub struct OverlayStyleBuilder {
    text: String,
    font_size: u32,
    font_path: Option<String>,
    position: Point,
    color: Rgb,
    opacity: f32,
    align: Align,
    background: Option<BackgroundPanel>,
    padding: u32,
    border_radius: u32,
    tuning: LayoutTuning,
}

impl OverlayStyleBuilder {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: DEFAULT_FONT_SIZE,
            font_path: None,
            position: Point::default(),
            color: DEFAULT_TEXT_COLOR,
            opacity: DEFAULT_OPACITY,
            align: Align::default(),
            background: None,
            padding: DEFAULT_PADDING,
            border_radius: DEFAULT_BORDER_RADIUS,
            tuning: LayoutTuning::default(),
        }
    }

    pub fn font_size(mut self, size: u32) -> Self {
        self.font_size = size;
        self
    }

    pub fn font_path(mut self, path: Option<String>) -> Self {
        self.font_path = path.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn position(mut self, x: i32, y: i32) -> Self {
        self.position = Point::new(x, y);
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn background(mut self, color: Rgb, opacity: f32) -> Self {
        self.background = Some(BackgroundPanel { color, opacity });
        self
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn border_radius(mut self, radius: u32) -> Self {
        self.border_radius = radius;
        self
    }

    pub fn tuning(mut self, tuning: LayoutTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> Result<OverlayStyle, ImageApiError> {
        check_range("font_size", self.font_size, MIN_FONT_SIZE, MAX_FONT_SIZE)?;
        check_range("padding", self.padding, 0, MAX_PADDING)?;
        check_range("border_radius", self.border_radius, 0, MAX_BORDER_RADIUS)?;
        check_unit("opacity", self.opacity)?;
        if let Some(background) = self.background.as_ref() {
            check_unit("bg_opacity", background.opacity)?;
        }
        if !(self.tuning.line_spacing_ratio.is_finite() && self.tuning.line_spacing_ratio > 0.0) {
            return Err(ImageApiError::validation(
                "line spacing ratio must be a positive number",
            ));
        }
        if !(self.tuning.panel_bottom_ratio.is_finite() && self.tuning.panel_bottom_ratio >= 0.0) {
            return Err(ImageApiError::validation(
                "panel bottom ratio must not be negative",
            ));
        }
        Ok(OverlayStyle {
            text: self.text,
            font_size: self.font_size,
            font_path: self.font_path,
            position: self.position,
            color: self.color,
            opacity: self.opacity,
            align: self.align,
            background: self.background,
            padding: self.padding,
            border_radius: self.border_radius,
            tuning: self.tuning,
        })
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<(), ImageApiError> {
    if value < min || value > max {
        return Err(ImageApiError::validation(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f32) -> Result<(), ImageApiError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ImageApiError::validation(format!(
            "{} must be between 0 and 1 (got {})",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_contract() {
        let style = OverlayStyle::builder("hi").build().expect("style");
        assert_eq!(style.font_size(), 60);
        assert_eq!(style.color(), Rgb(255, 255, 255));
        assert_eq!(style.align(), Align::Center);
        assert_eq!(style.position(), Point::new(0, 0));
        assert!((style.opacity() - 0.8).abs() < f32::EPSILON);
        assert!(style.background().is_none());
    }

    #[test]
    fn out_of_range_values_are_rejected_not_clamped() {
        for size in [9, 201] {
            let err = OverlayStyle::builder("x").font_size(size).build().unwrap_err();
            assert!(matches!(err, ImageApiError::Validation(_)), "size {}", size);
        }
        assert!(OverlayStyle::builder("x").font_size(10).build().is_ok());
        assert!(OverlayStyle::builder("x").font_size(200).build().is_ok());
        assert!(OverlayStyle::builder("x").padding(129).build().is_err());
        assert!(OverlayStyle::builder("x").border_radius(129).build().is_err());
        assert!(OverlayStyle::builder("x").opacity(1.01).build().is_err());
        assert!(OverlayStyle::builder("x").opacity(f32::NAN).build().is_err());
        assert!(
            OverlayStyle::builder("x")
                .background(DEFAULT_PANEL_COLOR, -0.1)
                .build()
                .is_err()
        );
    }

    #[test]
    fn blank_font_paths_are_ignored() {
        let style = OverlayStyle::builder("x")
            .font_path(Some("  ".to_string()))
            .build()
            .expect("style");
        assert_eq!(style.font_path(), None);
    }

    #[test]
    fn align_parses_case_insensitively() {
        assert_eq!("RIGHT".parse::<Align>().unwrap(), Align::Right);
        assert!("justify".parse::<Align>().is_err());
    }

    #[test]
    fn tuning_rounds_like_the_renderer() {
        let tuning = LayoutTuning::default();
        assert_eq!(tuning.line_spacing(40), 48);
        assert_eq!(tuning.line_spacing(60), 72);
        assert_eq!(tuning.panel_bottom_extra(60), 24);
        assert_eq!(tuning.panel_bottom_extra(45), 18);
    }
}
