//! HTTP transport abstraction
//!
//! The engine never talks to `reqwest` directly; dispatch goes through the
//! [`Transport`] trait so platform adapters and tests can substitute their
//! own implementation.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{HttpMethod, SyncOperation};

/// One outgoing request described by a queued operation
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Target URL
    pub url: String,
    /// Request method
    pub method: HttpMethod,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// JSON body, when present
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Build the wire request for a queued operation
    #[must_use]
    pub fn from_operation(operation: &SyncOperation) -> Self {
        Self {
            url: operation.target_url.clone(),
            method: operation.method,
            headers: operation.headers.clone(),
            body: operation.body.clone(),
        }
    }
}

/// Response surface the dispatch loop cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Trait for delivering queued requests (async)
///
/// Implementations return `Ok` for any response the server produced,
/// including non-2xx; `Err` is reserved for transport-level failures
/// (unreachable host, timeout, connection reset).
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Perform the request and return the server's response
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport with a bounded per-request timeout
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport applying `timeout` to every request
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_success_covers_2xx_only() {
        assert!(HttpResponse { status: 200, body: String::new() }.is_success());
        assert!(HttpResponse { status: 204, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 199, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 304, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 500, body: String::new() }.is_success());
    }

    #[test]
    fn request_mirrors_operation_fields() {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer t".to_string());
        let operation = SyncOperation::new(
            "https://api.example.com/notes/42",
            HttpMethod::Patch,
            Some(serde_json::json!({"title": "x"})),
            headers.clone(),
        );

        let request = HttpRequest::from_operation(&operation);
        assert_eq!(request.url, operation.target_url);
        assert_eq!(request.method, HttpMethod::Patch);
        assert_eq!(request.headers, headers);
        assert_eq!(request.body, operation.body);
    }
}
