//! HTTP capability used by remote sync providers.
//!
//! Providers build an [`HttpRequest`], hand it to the host's [`HttpClient`]
//! and decode the [`HttpResponse`] themselves. Status codes are never turned
//! into errors here; a 4xx or 5xx is still an `Ok` response so the provider
//! can map it onto its own error type.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request timeout, overriding the client default
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("invalid JSON body: {}", e)))
    }

    pub fn text(&self) -> Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|e| BridgeError::OperationFailed(format!("body is not UTF-8: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Rate limited or failed on the server side.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.is_server_error()
    }
}

/// How often and how patiently a request is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    ///
    /// ```
    /// use bridge_traits::http::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    /// assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    /// ```
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = if self.use_exponential_backoff {
            let factor = 2u32.saturating_pow(retry.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }
}

/// Host HTTP transport.
///
/// Remote providers issue every call through this trait so tests can script
/// responses with a mock.
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
///
/// let request = HttpRequest::new(HttpMethod::Get, "https://people.googleapis.com/v1/people/me")
///     .bearer_token(token);
/// let response = client.execute(request).await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request.
    ///
    /// # Errors
    ///
    /// Only transport failures (connection, TLS, timeout) are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Send with retries on transport failures and retryable statuses.
    ///
    /// The default sends once; native clients override it.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://people.googleapis.com/v1")
            .header("Accept", "application/json")
            .bearer_token("ya29.token")
            .timeout(Duration::from_secs(5));

        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer ya29.token")
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_status_classes() {
        assert!(response(204, "").is_success());
        assert!(!response(404, "").is_retryable());
        assert!(response(429, "").is_retryable());
        assert!(response(503, "").is_retryable());
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Person {
            #[serde(rename = "resourceName")]
            resource_name: String,
        }

        let person: Person = response(200, r#"{"resourceName":"people/c1"}"#)
            .json()
            .unwrap();
        assert_eq!(person.resource_name, "people/c1");
        assert!(response(200, "<html>").json::<Person>().is_err());
    }

    #[test]
    fn test_delay_without_backoff_is_constant() {
        let policy = RetryPolicy {
            use_exponential_backoff: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(4));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            use_exponential_backoff: true,
        };
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(40), Duration::from_millis(250));
    }
}
