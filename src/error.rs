/// Every failure the image pipeline and the generation proxy can surface.
///
/// Font problems never show up here; the resolver recovers from them locally.
#[derive(Debug, thiserror::Error)]
pub enum ImageApiError {
    #[error("{0}")]
    Validation(String),

    #[error("failed to fetch image source: {0}")]
    SourceFetch(String),

    #[error("failed to decode base64 image source: {0}")]
    SourceDecode(String),

    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    #[error("failed to render text overlay: {0}")]
    Render(String),

    #[error("image provider is not configured: {0}")]
    ProviderConfig(String),

    #[error("image provider request failed: {message}")]
    ProviderTransport { message: String, timed_out: bool },

    #[error("image provider error ({status}): {message}")]
    ProviderResponse { status: u16, message: String },
}

impl ImageApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ImageApiError::Validation(message.into())
    }

    /// HTTP status this error maps to at the request boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ImageApiError::Validation(_)
            | ImageApiError::SourceFetch(_)
            | ImageApiError::SourceDecode(_)
            | ImageApiError::ImageDecode(_) => 400,
            ImageApiError::Render(_) | ImageApiError::ProviderConfig(_) => 500,
            ImageApiError::ProviderTransport { timed_out, .. } => {
                if *timed_out {
                    504
                } else {
                    502
                }
            }
            ImageApiError::ProviderResponse { status, .. } => {
                if (400..=599).contains(status) {
                    *status
                } else {
                    502
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ImageApiError::ProviderTransport { .. })
    }
}
