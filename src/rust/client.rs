use std::time::Duration;

use log::debug;
use reqwest::{StatusCode, Url};

use crate::api::{ClassifyRequest, ClassifyResponse, ErrorBody};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// Request rejected locally; nothing was sent
    #[error("Invalid request: {0}")]
    Validation(String),
    /// Connection failure, timeout or undecodable body
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
}

/// Calls a remote classification service over HTTP.
#[derive(Debug, Clone)]
pub struct ClassificationClient {
    http: reqwest::Client,
    classify_url: Url,
    health_url: Url,
}

impl ClassificationClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// The URL is parsed here so later calls only fail on transport problems.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |path: &str| {
            Url::parse(&format!("{}/{}", base, path)).map_err(|e| ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })
        };
        let classify_url = endpoint("classify")?;
        let health_url = endpoint("health")?;
        if !matches!(classify_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", classify_url.scheme()),
            });
        }

        Ok(Self {
            http: reqwest::Client::builder().build()?,
            classify_url,
            health_url,
        })
    }

    /// Client for [`DEFAULT_BASE_URL`].
    pub fn new_default() -> Result<Self, ClientError> {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Classifies one text with a single request; nothing is retried.
    ///
    /// # Errors
    /// - `Validation` for empty text or `top_k` outside `1..=10`, before any request is made
    /// - `Transport` on connection failures, timeouts or an unreadable body
    /// - `Status` when the service answers with a non-success status
    pub async fn classify(
        &self,
        text: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<ClassifyResponse, ClientError> {
        let request = ClassifyRequest::new(text, top_k);
        request.validate().map_err(ClientError::Validation)?;
        let response = self
            .http
            .post(self.classify_url.clone())
            .json(&request)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|err| err.detail)
                .unwrap_or(body);
            return Err(ClientError::Status { status, detail });
        }
        Ok(response.json::<ClassifyResponse>().await?)
    }

    /// Classifies texts one request at a time, in order.
    ///
    /// The first failure stops the remaining requests and is returned.
    pub async fn classify_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<ClassifyResponse>, ClientError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.classify(text.as_ref(), top_k, timeout).await?);
        }
        Ok(results)
    }

    /// Best-effort liveness probe: `true` only for a `200` from `/health`.
    ///
    /// Transport failures (refused connection, timeout) are reported as `false`.
    pub async fn health_check(&self) -> bool {
        match self
            .http
            .get(self.health_url.clone())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_ignore_trailing_slash() {
        let client = ClassificationClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.classify_url.as_str(), "http://localhost:8000/classify");
        assert_eq!(client.health_url.as_str(), "http://localhost:8000/health");
    }

    #[test]
    fn test_malformed_base_url_is_rejected_up_front() {
        assert!(matches!(
            ClassificationClient::new("not a url"),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            ClassificationClient::new("ftp://example.com"),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_check_unreachable_host() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ClassificationClient::new(&format!("http://{}", addr)).unwrap();
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_sending() {
        // an unreachable host would give a transport error if anything were sent
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ClassificationClient::new(&format!("http://{}", addr)).unwrap();
        for (text, top_k) in [("", 3), ("great", 0), ("great", 11)] {
            let result = client.classify(text, top_k, DEFAULT_CLASSIFY_TIMEOUT).await;
            assert!(matches!(result, Err(ClientError::Validation(_))), "{:?}", (text, top_k));
        }
        let result = client
            .classify_batch(&["", "great"], 1, DEFAULT_BATCH_TIMEOUT)
            .await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_classify_unreachable_host_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ClassificationClient::new(&format!("http://{}", addr)).unwrap();
        let result = client.classify("great", 1, DEFAULT_CLASSIFY_TIMEOUT).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
