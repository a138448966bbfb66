use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{error, info};

use super::models::{
    AddTextRequest, AddTextResponse, ErrorResponse, GenerateImageRequest, GenerateImageResponse,
};
use super::state::ServerState;
use crate::codec;
use crate::error::ImageApiError;
use crate::overlay::{self, OverlayStyle};
use crate::providers::GenerationRequest;
use crate::source::ImageSource;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ImageApiError> for ServerError {
    fn from(err: ImageApiError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::internal(format!("server task failed: {}", err))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status.as_u16(), self.message);
        } else {
            info!("{} {}", self.status.as_u16(), self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

pub(crate) async fn generate_request(
    state: Arc<ServerState>,
    request: GenerateImageRequest,
) -> Result<GenerateImageResponse, ServerError> {
    let generation = GenerationRequest::new(
        request.prompt.as_str(),
        request.n,
        &request.size,
        &request.response_format,
        &request.style,
        &request.quality,
    )?;

    if request.prompt.trim().is_empty() {
        let image = default_background_image(state, request.text).await?;
        return Ok(GenerateImageResponse {
            images: vec![image],
            prompt: request.prompt,
        });
    }

    let images = state.generator.submit(&generation).await?;
    Ok(GenerateImageResponse {
        images,
        prompt: request.prompt,
    })
}

/// The default background as base64, with `text` drawn in the default style
/// when present.
async fn default_background_image(
    state: Arc<ServerState>,
    text: Option<String>,
) -> Result<String, ServerError> {
    let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
        return Ok(codec::to_base64(state.default_background()));
    };
    let style = OverlayStyle::builder(text)
        .tuning(state.settings.layout_tuning())
        .build()?;
    let png = tokio::task::spawn_blocking(move || {
        let image = codec::decode(state.default_background())?;
        overlay::render_overlay_png(&image, &style, &state.fonts)
    })
    .await??;
    Ok(codec::to_base64(&png))
}

pub(crate) async fn add_text_request(
    state: Arc<ServerState>,
    request: AddTextRequest,
) -> Result<AddTextResponse, ServerError> {
    let style = style_from_request(&request, &state)?;
    let image = state
        .loader
        .load(ImageSource::from_reference(request.image_source))
        .await?;
    let png = tokio::task::spawn_blocking(move || {
        overlay::render_overlay_png(&image, &style, &state.fonts)
    })
    .await??;
    Ok(AddTextResponse {
        image: codec::to_base64(&png),
        text: request.text,
    })
}

fn style_from_request(
    request: &AddTextRequest,
    state: &ServerState,
) -> Result<OverlayStyle, ImageApiError> {
    let mut builder = OverlayStyle::builder(request.text.clone())
        .font_size(non_negative("font_size", request.font_size)?)
        .font_path(request.font_path.clone())
        .position(request.position[0], request.position[1])
        .color(request.color)
        .opacity(request.opacity)
        .align(request.align.parse()?)
        .padding(non_negative("padding", request.padding)?)
        .border_radius(non_negative("border_radius", request.border_radius)?)
        .tuning(state.settings.layout_tuning());
    if request.bg_opacity != 0.0 {
        builder = builder.background(
            request.bg_color.unwrap_or(overlay::DEFAULT_PANEL_COLOR),
            request.bg_opacity,
        );
    }
    builder.build()
}

fn non_negative(name: &str, value: i64) -> Result<u32, ImageApiError> {
    u32::try_from(value)
        .map_err(|_| ImageApiError::validation(format!("{} is out of range (got {})", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_errors_keep_their_status() {
        let err = ServerError::from(ImageApiError::SourceFetch("404".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = ServerError::from(ImageApiError::ProviderTransport {
            message: "timed out".to_string(),
            timed_out: true,
        });
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn negative_sizes_are_rejected_not_wrapped() {
        let err = non_negative("padding", -1).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(non_negative("padding", 16).unwrap(), 16);
    }
}
