use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use super::retry::{RetryPolicy, Transport, TransportRequest};
use super::{GenerationRequest, ImageGenerationProvider, ProviderFuture, ResponseFormat};
use crate::error::ImageApiError;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "dall-e-3";

/// OpenAI `images/generations` client.
#[derive(Clone)]
pub struct OpenAIImages {
    key: Option<String>,
    model: String,
    base_url: String,
    transports: Vec<Arc<dyn Transport>>,
    policy: RetryPolicy,
}

impl OpenAIImages {
    /// A missing key is accepted here and reported on first use.
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|value| !value.trim().is_empty()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            transports: Vec::new(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.base_url = trimmed.to_string();
        }
        self
    }

    pub fn with_transports(mut self, transports: Vec<Arc<dyn Transport>>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    async fn call(&self, request: &GenerationRequest) -> Result<Vec<String>, ImageApiError> {
        let key = self.key.as_deref().ok_or_else(|| {
            ImageApiError::ProviderConfig("OPENAI_API_KEY is not set".to_string())
        })?;
        let transport_request = TransportRequest {
            url: self.endpoint(),
            bearer: key.to_string(),
            body: request_body(&self.model, request),
        };
        let response = self
            .policy
            .execute("OpenAI", &self.transports, &transport_request)
            .await?;
        if !response.is_success() {
            return Err(ImageApiError::ProviderResponse {
                status: response.status,
                message: extract_openai_error(&response.body).unwrap_or(response.body),
            });
        }
        extract_images(&response.body, request.response_format())
    }
}

impl ImageGenerationProvider for OpenAIImages {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a> {
        Box::pin(self.call(request))
    }
}

impl fmt::Debug for OpenAIImages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIImages")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_key", &self.key.is_some())
            .field(
                "transports",
                &self
                    .transports
                    .iter()
                    .map(|transport| transport.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn request_body(model: &str, request: &GenerationRequest) -> serde_json::Value {
    json!({
        "model": model,
        "prompt": request.prompt(),
        "n": request.n(),
        "size": request.size(),
        "response_format": request.response_format(),
        "style": request.style(),
        "quality": request.quality(),
    })
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

fn extract_images(body: &str, format: ResponseFormat) -> Result<Vec<String>, ImageApiError> {
    let payload: ImagesResponse =
        serde_json::from_str(body).map_err(|err| ImageApiError::ProviderResponse {
            status: 502,
            message: format!("failed to parse OpenAI response JSON: {}", err),
        })?;
    let images = payload
        .data
        .into_iter()
        .filter_map(|datum| match format {
            ResponseFormat::Url => datum.url,
            ResponseFormat::Base64Json => datum.b64_json,
        })
        .collect::<Vec<_>>();
    if images.is_empty() {
        return Err(ImageApiError::ProviderResponse {
            status: 502,
            message: format!("no {} images returned from OpenAI", format),
        });
    }
    Ok(images)
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let present = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
    let parts = [
        present(message),
        present(kind).map(|kind| format!("type: {}", kind)),
        present(code).map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::retry::tests::{ScriptedTransport, instant_policy, ok, refused};
    use insta::{assert_json_snapshot, assert_snapshot};

    fn request(format: &str) -> GenerationRequest {
        GenerationRequest::new("a red bicycle", 2, "1024x1792", format, "natural", "hd").unwrap()
    }

    fn client(key: Option<&str>, transports: Vec<Arc<dyn Transport>>) -> OpenAIImages {
        OpenAIImages::new(key.map(str::to_string))
            .with_base_url("http://openai.test/v1/")
            .with_transports(transports)
            .with_policy(instant_policy())
    }

    const TWO_IMAGES: &str = r#"{
        "created": 1700000000,
        "data": [
            {"url": "https://images.example/1.png", "revised_prompt": "a red bicycle"},
            {"url": "https://images.example/2.png", "revised_prompt": "a red bicycle"}
        ]
    }"#;

    #[test]
    fn request_body_snapshot() {
        assert_json_snapshot!(request_body(DEFAULT_MODEL, &request("b64_json")), @r#"
        {
          "model": "dall-e-3",
          "n": 2,
          "prompt": "a red bicycle",
          "quality": "hd",
          "response_format": "b64_json",
          "size": "1024x1792",
          "style": "natural"
        }
        "#);
    }

    #[test]
    fn extract_urls_snapshot() {
        let images = extract_images(TWO_IMAGES, ResponseFormat::Url).unwrap();
        assert_json_snapshot!(images, @r#"
        [
          "https://images.example/1.png",
          "https://images.example/2.png"
        ]
        "#);
    }

    #[test]
    fn base64_format_reads_the_b64_field() {
        let body = r#"{"data": [{"b64_json": "aGVsbG8="}]}"#;
        let images = extract_images(body, ResponseFormat::Base64Json).unwrap();
        assert_eq!(images, vec!["aGVsbG8=".to_string()]);
        assert!(extract_images(body, ResponseFormat::Url).is_err());
    }

    #[test]
    fn error_bodies_are_condensed() {
        let body = r#"{"error": {"message": "Your prompt was rejected", "type": "invalid_request_error", "code": "content_policy_violation"}}"#;
        assert_snapshot!(
            extract_openai_error(body).unwrap(),
            @"Your prompt was rejected | type: invalid_request_error | code: content_policy_violation"
        );
        assert_eq!(extract_openai_error("not json"), None);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_network_call() {
        let transport = ScriptedTransport::new("direct", vec![ok(200, TWO_IMAGES)]);
        let client = client(None, vec![transport.clone()]);
        let err = client.generate(&request("url")).await.unwrap_err();
        assert!(matches!(err, ImageApiError::ProviderConfig(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn proxy_failure_falls_back_to_a_direct_connection() {
        let proxy = ScriptedTransport::new("system-proxy", vec![Err(refused())]);
        let direct = ScriptedTransport::new("direct", vec![ok(200, TWO_IMAGES)]);
        let client = client(Some("sk-test"), vec![proxy.clone(), direct.clone()]);
        let images = client.generate(&request("url")).await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(proxy.calls(), 1);

        let sent = direct.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.url, "http://openai.test/v1/images/generations");
        assert_eq!(sent.bearer, "sk-test");
    }

    #[tokio::test]
    async fn upstream_errors_keep_their_status() {
        let body = r#"{"error": {"message": "Invalid size", "type": "invalid_request_error"}}"#;
        let transport = ScriptedTransport::new("direct", vec![ok(400, body)]);
        let client = client(Some("sk-test"), vec![transport]);
        let err = client.generate(&request("url")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("Invalid size"), "{}", err);
    }
}
