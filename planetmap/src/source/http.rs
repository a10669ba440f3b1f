//! HTTP client abstraction for testability

use super::error::HttpError;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default User-Agent string for map server requests.
const DEFAULT_USER_AGENT: &str = concat!("planetmap/", env!("CARGO_PKG_VERSION"));

/// A received HTTP response, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Media type without parameters, lower-cased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for asynchronous HTTP GET.
///
/// Allows map sources to be tested against scripted responses.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// Non-success statuses are returned as responses; only transport
    /// failures are errors. Dropping the future aborts the connection.
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, HttpError>> + Send;
}

/// HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        trace!(url = url, "HTTP GET request starting");

        let response = match self.client.get(url).send().await {
            Ok(resp) => {
                debug!(
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(if e.is_timeout() {
                    HttpError::Timeout(e.to_string())
                } else if e.is_builder() {
                    HttpError::InvalidUrl(e.to_string())
                } else {
                    HttpError::Connection(e.to_string())
                });
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => {
                trace!(url = url, bytes = body.len(), "HTTP response body read");
                Ok(HttpResponse {
                    status,
                    content_type,
                    body,
                })
            }
            Err(e) if e.is_timeout() => Err(HttpError::Timeout(e.to_string())),
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(HttpError::Body(e.to_string()))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockHttpClient;
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        let response = HttpResponse {
            status: 200,
            content_type: Some("Image/PNG; charset=binary".to_string()),
            body: Bytes::new(),
        };
        assert_eq!(response.media_type().as_deref(), Some("image/png"));
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_mock_client_records_requests() {
        let mock = MockHttpClient::ok("image/png", vec![1, 2, 3]);
        let response = mock.get("http://example.com/wms").await.unwrap();
        assert_eq!(response.body.as_ref(), &[1, 2, 3]);
        assert_eq!(mock.requests.lock().as_slice(), ["http://example.com/wms"]);
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockHttpClient::new(Err(HttpError::Timeout("slow".to_string())));
        assert!(mock.get("http://example.com").await.is_err());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestHttpClient::new(Duration::from_secs(5)).is_ok());
    }
}
