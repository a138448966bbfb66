use image::RgbaImage;
use std::time::Duration;
use tracing::{debug, info};

use crate::codec;
use crate::error::ImageApiError;

/// Where an image to be overlaid comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    Base64(String),
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Classifies a string reference: `http(s)://` is fetched, anything else
    /// is treated as a base64 payload.
    pub fn from_reference(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        if is_remote(&reference) {
            ImageSource::Url(reference.trim().to_string())
        } else {
            ImageSource::Base64(reference)
        }
    }

    fn hint(&self) -> &'static str {
        match self {
            ImageSource::Url(_) => "url",
            ImageSource::Base64(_) => "base64",
            ImageSource::Bytes(_) => "bytes",
        }
    }
}

fn is_remote(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves image references into RGBA pixels. Holds no cache.
#[derive(Debug, Clone)]
pub struct ImageSourceLoader {
    client: reqwest::Client,
}

impl ImageSourceLoader {
    pub fn new(fetch_timeout: Duration) -> Result<Self, ImageApiError> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|err| ImageApiError::SourceFetch(err.to_string()))?;
        Ok(Self { client })
    }

    pub async fn load(&self, source: ImageSource) -> Result<RgbaImage, ImageApiError> {
        let hint = source.hint();
        let bytes = match source {
            ImageSource::Url(url) => self.fetch(&url).await?,
            ImageSource::Base64(payload) => codec::from_base64(&payload)?,
            ImageSource::Bytes(bytes) => bytes,
        };
        debug!("decoding {} byte image from {}", bytes.len(), hint);
        codec::decode(&bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageApiError> {
        info!("fetching image source {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ImageApiError::SourceFetch(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageApiError::SourceFetch(format!(
                "{} returned {}",
                url, status
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ImageApiError::SourceFetch(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}
