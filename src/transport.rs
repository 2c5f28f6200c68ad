use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Request timeout used when a profile does not set one
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Response exactly as received; status and body are not interpreted here
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {}s", timeout.as_secs_f64())]
    Timeout { url: String, timeout: Duration },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Sends one request body to a provider
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_request(
        &self,
        path: &str,
        body: &Value,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// OpenAI-compatible HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_request(
        &self,
        path: &str,
        body: &Value,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url(path);
        trace!("POST {} ({} header(s))", url, headers.len());

        let started = Instant::now();
        let mut request = self.client.post(&url).timeout(timeout).json(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                TransportError::Timeout {
                    url: url.clone(),
                    timeout,
                }
            } else {
                TransportError::Request {
                    url: url.clone(),
                    source,
                }
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|source| {
            if source.is_timeout() {
                TransportError::Timeout {
                    url: url.clone(),
                    timeout,
                }
            } else {
                TransportError::Body {
                    url: url.clone(),
                    source,
                }
            }
        })?;
        let elapsed = started.elapsed();

        debug!(
            "Response from {}: status {}, {} bytes in {:.2}s",
            url,
            status,
            text.len(),
            elapsed.as_secs_f64()
        );
        Ok(RawResponse {
            status,
            body: text,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_joins_paths() {
        let transport = HttpTransport::new("http://localhost:8000/");
        assert_eq!(transport.url("/v1/chat"), "http://localhost:8000/v1/chat");
        assert_eq!(transport.url("chat"), "http://localhost:8000/chat");
        assert_eq!(transport.url(""), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_send_request_posts_json_with_headers() {
        let server = MockServer::start().await;
        let request_body = json!({"model": "m", "messages": []});
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("x-team", "bench"))
            .and(body_json(&request_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri());
        let headers = HashMap::from([("x-team".to_string(), "bench".to_string())]);
        let response = transport
            .send_request("/chat/completions", &request_body, &headers, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(
            serde_json::from_str::<Value>(&response.body).unwrap(),
            json!({"choices": []})
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri());
        let response = transport
            .send_request("/", &json!({}), &HashMap::new(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert_eq!(response.body, "upstream unavailable");
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri());
        let error = transport
            .send_request("/", &json!({}), &HashMap::new(), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(error, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1");
        let error = transport
            .send_request("/", &json!({}), &HashMap::new(), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            TransportError::Request { .. } | TransportError::Timeout { .. }
        ));
    }
}
