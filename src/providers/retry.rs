use reqwest::header::HeaderMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::ImageApiError;

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub bearer: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, ImageApiError>> + Send + 'a>>;

/// One way of reaching the provider. Failures to connect or time out must be
/// reported as [`ImageApiError::ProviderTransport`] so the policy can move on.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;
    fn post_json<'a>(&'a self, request: &'a TransportRequest) -> TransportFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    name: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Honors `HTTP(S)_PROXY` from the environment.
    pub fn system_proxy(timeout: Duration) -> Result<Self, ImageApiError> {
        Self::build("system-proxy", reqwest::Client::builder().timeout(timeout))
    }

    /// Connects directly, ignoring any configured proxy.
    pub fn direct(timeout: Duration) -> Result<Self, ImageApiError> {
        Self::build(
            "direct",
            reqwest::Client::builder().timeout(timeout).no_proxy(),
        )
    }

    fn build(name: &str, builder: reqwest::ClientBuilder) -> Result<Self, ImageApiError> {
        let client = builder
            .build()
            .map_err(|err| ImageApiError::ProviderConfig(format!("http client: {}", err)))?;
        Ok(Self {
            name: name.to_string(),
            client,
        })
    }
}

impl Transport for ReqwestTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn post_json<'a>(&'a self, request: &'a TransportRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&request.url)
                .bearer_auth(&request.bearer)
                .json(&request.body)
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status().as_u16();
            let retry_after = retry_after(response.headers());
            let body = response.text().await.map_err(transport_error)?;
            Ok(TransportResponse {
                status,
                retry_after,
                body,
            })
        })
    }
}

fn transport_error(err: reqwest::Error) -> ImageApiError {
    ImageApiError::ProviderTransport {
        timed_out: err.is_timeout(),
        message: err.to_string(),
    }
}

/// Tries each transport in order. Transport failures fall through to the
/// next transport; rate-limited responses back off and retry on the same
/// one. Any other response, successful or not, is returned as is.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RATE_LIMIT_MAX_RETRIES,
            base_delay: RATE_LIMIT_BASE_DELAY,
            max_delay: RATE_LIMIT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub async fn execute(
        &self,
        provider: &str,
        transports: &[Arc<dyn Transport>],
        request: &TransportRequest,
    ) -> Result<TransportResponse, ImageApiError> {
        let mut last_error = None;
        for transport in transports {
            let mut attempt = 0usize;
            let mut delay = self.base_delay;
            loop {
                attempt += 1;
                let response = match transport.post_json(request).await {
                    Ok(response) => response,
                    Err(err) if err.is_retryable() => {
                        warn!(
                            "{} request via {} failed: {}",
                            provider,
                            transport.name(),
                            err
                        );
                        last_error = Some(err);
                        break;
                    }
                    Err(err) => return Err(err),
                };
                if !response.is_success()
                    && is_rate_limited(response.status, &response.body)
                    && attempt < self.max_attempts
                {
                    delay = self
                        .wait_with_backoff(provider, attempt, delay, response.retry_after)
                        .await;
                    continue;
                }
                return Ok(response);
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ImageApiError::ProviderConfig(format!("no transports configured for {}", provider))
        }))
    }

    async fn wait_with_backoff(
        &self,
        provider: &str,
        attempt: usize,
        delay: Duration,
        retry_after: Option<Duration>,
    ) -> Duration {
        let mut wait = delay;
        if let Some(retry_after) = retry_after
            && retry_after > wait
        {
            wait = retry_after.min(self.max_delay);
        }
        warn!(
            "{} rate limited; retrying in {:.1}s (attempt {}/{})",
            provider,
            wait.as_secs_f32(),
            attempt,
            self.max_attempts
        );
        sleep(wait).await;
        self.next_delay(delay)
    }

    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        let next = current.saturating_mul(2).max(self.base_delay);
        next.min(self.max_delay)
    }
}

pub(crate) fn is_rate_limited(status: u16, body: &str) -> bool {
    if matches!(status, 429 | 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("quota")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}
