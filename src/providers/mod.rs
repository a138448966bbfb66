use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::ImageApiError;
use crate::settings::Settings;

mod openai;
pub mod retry;

pub use openai::OpenAIImages;
pub use retry::{ReqwestTransport, RetryPolicy, Transport, TransportRequest, TransportResponse};

pub const MIN_IMAGES: i64 = 1;
pub const MAX_IMAGES: i64 = 10;

macro_rules! wire_enum {
    ($name:ident, $label:literal, $default:ident, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ImageApiError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str() == trimmed)
                    .ok_or_else(|| {
                        let expected = $name::ALL
                            .iter()
                            .map(|candidate| candidate.as_str())
                            .collect::<Vec<_>>()
                            .join(", ");
                        ImageApiError::validation(format!(
                            "invalid {} '{}' (expected one of: {})",
                            $label, trimmed, expected
                        ))
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(ImageSize, "size", Square1024, {
    Square256 => "256x256",
    Square512 => "512x512",
    Square1024 => "1024x1024",
    Landscape => "1792x1024",
    Portrait => "1024x1792",
});

wire_enum!(ResponseFormat, "response_format", Url, {
    Url => "url",
    Base64Json => "b64_json",
});

wire_enum!(ImageStyle, "style", Vivid, {
    Vivid => "vivid",
    Natural => "natural",
});

wire_enum!(ImageQuality, "quality", Standard, {
    Standard => "standard",
    Hd => "hd",
});

/// A validated generation request. Only [`GenerationRequest::new`] builds one,
/// so holding a value means `n` and every enumerated field are in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    n: u8,
    size: ImageSize,
    response_format: ResponseFormat,
    style: ImageStyle,
    quality: ImageQuality,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        n: i64,
        size: &str,
        response_format: &str,
        style: &str,
        quality: &str,
    ) -> Result<Self, ImageApiError> {
        if !(MIN_IMAGES..=MAX_IMAGES).contains(&n) {
            return Err(ImageApiError::validation(format!(
                "n must be between {} and {} (got {})",
                MIN_IMAGES, MAX_IMAGES, n
            )));
        }
        Ok(Self {
            prompt: prompt.into(),
            n: n as u8,
            size: size.parse()?,
            response_format: response_format.parse()?,
            style: style.parse()?,
            quality: quality.parse()?,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn n(&self) -> u8 {
        self.n
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn response_format(&self) -> ResponseFormat {
        self.response_format
    }

    pub fn style(&self) -> ImageStyle {
        self.style
    }

    pub fn quality(&self) -> ImageQuality {
        self.quality
    }
}

pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<String>, ImageApiError>> + Send + 'a>>;

/// A text-to-image backend. Returns one entry per generated image: a URL or a
/// base64 payload, depending on the requested response format.
pub trait ImageGenerationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a>;
}

/// Builds the configured provider.
pub fn build_provider(
    settings: &Settings,
) -> Result<Arc<dyn ImageGenerationProvider>, ImageApiError> {
    let timeout = Duration::from_secs(settings.provider_timeout_secs);
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    transports.push(Arc::new(ReqwestTransport::system_proxy(timeout)?));
    if settings.proxy_fallback {
        transports.push(Arc::new(ReqwestTransport::direct(timeout)?));
    }
    let provider = OpenAIImages::new(settings.openai_api_key.clone())
        .with_model(settings.image_model.clone())
        .with_base_url(settings.openai_base_url.clone())
        .with_transports(transports);
    Ok(Arc::new(provider))
}

/// Thin front for the generation provider: validates the request shape
/// before anything leaves the process.
#[derive(Clone)]
pub struct GenerationProxy {
    provider: Arc<dyn ImageGenerationProvider>,
}

impl GenerationProxy {
    pub fn new(provider: Arc<dyn ImageGenerationProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        n: i64,
        size: &str,
        response_format: &str,
        style: &str,
        quality: &str,
    ) -> Result<Vec<String>, ImageApiError> {
        let request = GenerationRequest::new(prompt, n, size, response_format, style, quality)?;
        self.submit(&request).await
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<Vec<String>, ImageApiError> {
        info!(
            "generating {} image(s) at {} via {}",
            request.n(),
            request.size(),
            self.provider.name()
        );
        self.provider.generate(request).await
    }
}

impl fmt::Debug for GenerationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationProxy")
            .field("provider", &self.provider.name())
            .finish()
    }
}
