//! `HttpClient` on top of reqwest.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("contact-sync-core/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled rustls client.
///
/// `execute` sends once. `execute_with_retry` also retries connection
/// failures, timeouts, 429 and 5xx with the policy's backoff; the last
/// retryable response is returned as is once attempts run out.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map(Self::with_client)
            .map_err(|e| BridgeError::NotAvailable(format!("reqwest client: {}", e)))
    }

    /// Use a client configured by the host (proxy, custom roots).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn transport_error(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::OperationFailed("request timed out".to_string())
    } else if error.is_connect() {
        BridgeError::OperationFailed(format!("connection failed: {}", error))
    } else {
        BridgeError::OperationFailed(error.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(url = %request.url, method = ?request.method, "HTTP request");
        self.send(&request).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let last = attempt == attempts;
            match self.send(&request).await {
                Ok(response) if response.is_retryable() && !last => {
                    warn!(status = response.status, attempt, "Retryable HTTP status");
                }
                Ok(response) => return Ok(response),
                Err(e) if !last => {
                    warn!(error = %e, attempt, "HTTP transport failure");
                }
                Err(e) => return Err(e),
            }

            let delay = policy.delay_for(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying HTTP request");
            tokio::time::sleep(delay).await;
        }

        Err(BridgeError::OperationFailed(
            "retry attempts exhausted".to_string(),
        ))
    }
}
