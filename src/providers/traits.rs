use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::storage::Credentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// First `max` characters of the body, for error messages
    pub fn excerpt(&self, max: usize) -> String {
        self.body.chars().take(max).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Transport(String),
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

/// Authenticated transport to the remote service. No retries at this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// `path` is relative to the API root, e.g. `/organizations`
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError>;

    async fn get(&self, path: &str, timeout: Duration) -> Result<HttpResponse, NetworkError> {
        self.request(Method::GET, path, None, timeout).await
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError> {
        self.request(Method::POST, path, Some(body), timeout).await
    }

    /// POST and return only the status; the response body is never read.
    /// Used for streamed answers nobody consumes.
    async fn post_status(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, NetworkError> {
        Ok(self.post(path, body, timeout).await?.status)
    }
}

/// Builds a transport that carries the given credentials
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn HttpTransport>, NetworkError>;
}
