//! reqwest-backed transport that sends the session cookies on every request

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::Config;
use crate::providers::traits::*;
use crate::storage::Credentials;

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &Config, credentials: &Credentials) -> Result<Self, NetworkError> {
        let base =
            Url::parse(&config.base_url).map_err(|e| NetworkError::Setup(e.to_string()))?;

        let jar = Jar::default();
        let domain = credentials.domain().trim_start_matches('.');
        for (name, value) in credentials.iter() {
            jar.add_cookie_str(&format!("{}={}; Domain={}; Path=/", name, value, domain), &base);
        }
        // Cookies scoped to the real domain won't match a local base URL
        if base.host_str() != Some(domain) {
            for (name, value) in credentials.iter() {
                jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &base);
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Ok(origin) = HeaderValue::from_str(config.origin()) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", config.origin())) {
            headers.insert(REFERER, referer);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| NetworkError::Setup(e.to_string()))?;

        log::debug!(
            "HTTP client ready for {} with {} cookies",
            config.base_url,
            credentials.len()
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ReqwestTransport {
    fn builder(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, &url).timeout(timeout);
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError> {
        let response = self
            .builder(method, path, body, timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }

    async fn post_status(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, NetworkError> {
        // Dropping the response closes the stream without waiting for its end
        let response = self
            .builder(Method::POST, path, Some(body), timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(response.status().as_u16())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Transport(e.to_string())
    }
}

/// Connector producing [`ReqwestTransport`]s for one configuration
pub struct ReqwestConnector {
    config: Config,
}

impl ReqwestConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Connector for ReqwestConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn HttpTransport>, NetworkError> {
        Ok(Arc::new(ReqwestTransport::new(&self.config, credentials)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_for_local_base() {
        let config = Config {
            base_url: "http://127.0.0.1:9/api".to_string(),
            ..Config::default()
        };
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc");
        let transport = ReqwestTransport::new(&config, &creds).unwrap();
        assert_eq!(transport.base_url, "http://127.0.0.1:9/api");
    }

    #[test]
    fn test_bad_base_url_is_setup_error() {
        let config = Config {
            base_url: "not a url".to_string(),
            ..Config::default()
        };
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc");
        assert!(matches!(
            ReqwestTransport::new(&config, &creds),
            Err(NetworkError::Setup(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let config = Config {
            base_url: "http://127.0.0.1:9/api".to_string(),
            ..Config::default()
        };
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc");
        let transport = ReqwestConnector::new(config).connect(&creds).unwrap();
        let result = transport
            .get("/organizations", Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(NetworkError::Transport(_)) | Err(NetworkError::Timeout)
        ));
    }

    /// Local server that answers 200 and then stalls halfway through the body
    async fn stalling_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\ndata: partial")
                        .await;
                    tokio::time::sleep(Duration::from_secs(10)).await;
                });
            }
        });
        format!("http://{}/api", addr)
    }

    #[tokio::test]
    async fn test_post_status_does_not_wait_for_streamed_body() {
        let config = Config {
            base_url: stalling_server().await,
            ..Config::default()
        };
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc");
        let transport = ReqwestConnector::new(config).connect(&creds).unwrap();
        let body = serde_json::json!({ "prompt": "hi" });
        let timeout = Duration::from_millis(500);

        let status = transport.post_status("/completion", &body, timeout).await;
        assert_eq!(status, Ok(200));

        // Reading the whole body runs into the timeout instead
        let full = transport.post("/completion", &body, timeout).await;
        assert!(matches!(
            full,
            Err(NetworkError::Timeout) | Err(NetworkError::Transport(_))
        ));
    }
}
