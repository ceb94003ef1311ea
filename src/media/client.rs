use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Media API returned status {0}")]
    Status(u16),
    #[error("Media API returned no download url")]
    EmptyUrl,
    #[error("Invalid media url: {0}")]
    InvalidUrl(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Response from the media graph `/<token>` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct MediaLookup {
    #[serde(default)]
    pub url: Option<String>,
}

/// Downloaded media bytes and the declared content type, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client for the messaging provider's media graph API
#[derive(Clone)]
pub struct MediaGraphClient {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl MediaGraphClient {
    pub fn new(base_url: String, bearer_token: Option<String>) -> Self {
        Self::with_circuit_breaker(base_url, bearer_token, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        bearer_token: Option<String>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        MediaGraphClient {
            client,
            base_url,
            bearer_token,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn lookup_url(&self, token: &str) -> Result<Url, MediaError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| MediaError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| MediaError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(token);
        Ok(url)
    }

    /// Resolve a media token into a short-lived download url.
    pub async fn resolve(&self, token: &str) -> Result<String, MediaError> {
        let request = self.authorized(self.client.get(self.lookup_url(token)?));

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(MediaError::Status(response.status().as_u16()));
                }

                let lookup = response.json::<MediaLookup>().await?;
                match lookup.url {
                    Some(url) if !url.trim().is_empty() => Ok(url),
                    _ => Err(MediaError::EmptyUrl),
                }
            })
            .await;

        match result {
            Ok(url) => Ok(url),
            Err(FailsafeError::Rejected) => Err(MediaError::CircuitBreakerOpen(
                "media graph circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Download a resolved url with the same credential.
    pub async fn download(&self, url: &str) -> Result<MediaAsset, MediaError> {
        let url = Url::parse(url).map_err(|e| MediaError::InvalidUrl(format!("{}: {}", url, e)))?;
        let request = self.authorized(self.client.get(url));

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(MediaError::Status(response.status().as_u16()));
                }

                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let bytes = response.bytes().await?;

                Ok(MediaAsset {
                    bytes: bytes.to_vec(),
                    content_type,
                })
            })
            .await;

        match result {
            Ok(asset) => Ok(asset),
            Err(FailsafeError::Rejected) => Err(MediaError::CircuitBreakerOpen(
                "media graph circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
