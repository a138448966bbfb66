use serde::{Deserialize, Serialize};

use crate::overlay::{
    Align, DEFAULT_BORDER_RADIUS, DEFAULT_FONT_SIZE, DEFAULT_OPACITY, DEFAULT_PADDING,
    DEFAULT_TEXT_COLOR, Rgb,
};
use crate::providers::{ImageQuality, ImageSize, ImageStyle, ResponseFormat};

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateImageRequest {
    pub(crate) prompt: String,
    #[serde(default = "default_n")]
    pub(crate) n: i64,
    #[serde(default = "default_size")]
    pub(crate) size: String,
    #[serde(default = "default_response_format")]
    pub(crate) response_format: String,
    #[serde(default = "default_style")]
    pub(crate) style: String,
    #[serde(default = "default_quality")]
    pub(crate) quality: String,
    /// Drawn onto the default background when `prompt` is empty.
    #[serde(default)]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateImageResponse {
    pub(crate) images: Vec<String>,
    pub(crate) prompt: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddTextRequest {
    pub(crate) image_source: String,
    pub(crate) text: String,
    #[serde(default = "default_font_size")]
    pub(crate) font_size: i64,
    #[serde(default)]
    pub(crate) position: [i32; 2],
    #[serde(default = "default_color")]
    pub(crate) color: Rgb,
    #[serde(default = "default_opacity")]
    pub(crate) opacity: f32,
    #[serde(default = "default_align")]
    pub(crate) align: String,
    #[serde(default)]
    pub(crate) font_path: Option<String>,
    #[serde(default)]
    pub(crate) bg_color: Option<Rgb>,
    #[serde(default)]
    pub(crate) bg_opacity: f32,
    #[serde(default = "default_padding")]
    pub(crate) padding: i64,
    #[serde(default = "default_border_radius")]
    pub(crate) border_radius: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddTextResponse {
    pub(crate) image: String,
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) detail: String,
}

fn default_n() -> i64 {
    1
}

fn default_size() -> String {
    ImageSize::default().as_str().to_string()
}

fn default_response_format() -> String {
    ResponseFormat::default().as_str().to_string()
}

fn default_style() -> String {
    ImageStyle::default().as_str().to_string()
}

fn default_quality() -> String {
    ImageQuality::default().as_str().to_string()
}

fn default_font_size() -> i64 {
    DEFAULT_FONT_SIZE as i64
}

fn default_color() -> Rgb {
    DEFAULT_TEXT_COLOR
}

fn default_opacity() -> f32 {
    DEFAULT_OPACITY
}

fn default_align() -> String {
    Align::default().as_str().to_string()
}

fn default_padding() -> i64 {
    DEFAULT_PADDING as i64
}

fn default_border_radius() -> i64 {
    DEFAULT_BORDER_RADIUS as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_text_defaults_fill_omitted_fields() {
        let request: AddTextRequest =
            serde_json::from_str(r#"{"image_source": "aGk=", "text": "Hi"}"#).unwrap();
        assert_eq!(request.font_size, 60);
        assert_eq!(request.position, [0, 0]);
        assert_eq!(request.color, Rgb(255, 255, 255));
        assert_eq!(request.opacity, 0.8);
        assert_eq!(request.align, "center");
        assert_eq!(request.bg_color, None);
        assert_eq!(request.bg_opacity, 0.0);
        assert_eq!((request.padding, request.border_radius), (16, 12));
    }

    #[test]
    fn generate_defaults_fill_omitted_fields() {
        let request: GenerateImageRequest = serde_json::from_str(r#"{"prompt": "x"}"#).unwrap();
        assert_eq!(request.n, 1);
        assert_eq!(request.size, "1024x1024");
        assert_eq!(request.response_format, "url");
        assert_eq!(request.style, "vivid");
        assert_eq!(request.quality, "standard");
        assert!(request.text.is_none());
    }
}
