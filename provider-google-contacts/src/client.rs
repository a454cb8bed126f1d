//! People API client
//!
//! Thin wrapper over the host `HttpClient` that fetches pages of connections
//! with the account's bearer token. Rate limits and server errors are retried
//! with exponential backoff; other client errors fail immediately.

use crate::error::{GoogleContactsError, Result};
use crate::types::ConnectionsResponse;
use bridge_traits::auth::AccessTokenProvider;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const PEOPLE_API_BASE: &str = "https://people.googleapis.com/v1";

/// Fields requested for every connection
const PERSON_FIELDS: &str =
    "names,emailAddresses,phoneNumbers,addresses,organizations,birthdays,photos";

const PAGE_SIZE: u32 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PeopleClient {
    http: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    retry: RetryPolicy,
}

impl PeopleClient {
    pub fn new(http: Arc<dyn HttpClient>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http,
            tokens,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one page of the account's connections.
    ///
    /// Pass the stored `sync_token` to receive only changes since the last
    /// full pass. An expired token is reported as `SyncTokenExpired`.
    #[instrument(skip(self, page_token, sync_token), fields(account = %account_id))]
    pub async fn list_connections(
        &self,
        account_id: &str,
        page_token: Option<&str>,
        sync_token: Option<&str>,
    ) -> Result<ConnectionsResponse> {
        let mut url = format!(
            "{}/people/me/connections?personFields={}&pageSize={}",
            PEOPLE_API_BASE,
            urlencoding::encode(PERSON_FIELDS),
            PAGE_SIZE
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        match sync_token {
            Some(token) => {
                url.push_str("&syncToken=");
                url.push_str(&urlencoding::encode(token));
            }
            None => url.push_str("&requestSyncToken=true"),
        }

        let token = self.tokens.access_token(account_id).await?;
        let response = self.get_with_retry(&url, &token).await?;

        let page: ConnectionsResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleContactsError::ParseError(format!("connections list: {}", e))
        })?;

        debug!(
            count = page.connections.len(),
            has_next = page.next_page_token.is_some(),
            "Fetched connections page"
        );
        Ok(page)
    }

    /// Check that a token can be obtained for `account_id`, or that any
    /// account is connected when none is given.
    pub async fn validate(&self, account_id: Option<&str>) -> Result<()> {
        match account_id {
            Some(account) => {
                self.tokens.access_token(account).await?;
            }
            None => {
                if self.tokens.accounts().await?.is_empty() {
                    return Err(GoogleContactsError::NoAccounts);
                }
            }
        }
        Ok(())
    }

    async fn get_with_retry(&self, url: &str, token: &str) -> Result<HttpResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let request = HttpRequest::new(HttpMethod::Get, url)
                .bearer_token(token)
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);

            let response = self.http.execute(request).await?;
            let status = response.status;

            if response.is_success() {
                return Ok(response);
            }

            if status == 410 {
                return Err(GoogleContactsError::SyncTokenExpired);
            }

            if response.is_retryable() {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(status, attempts = attempt, "People API request gave up");
                    return Err(GoogleContactsError::ApiError {
                        status_code: status,
                        message: format!("request failed after {} attempts", attempt),
                    });
                }

                let delay = self.retry.delay_for(attempt);
                warn!(
                    status,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "People API request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = response
                .text()
                .unwrap_or_else(|_| "<non-utf8 body>".to_string());
            warn!(status, "People API request rejected");
            return Err(GoogleContactsError::ApiError {
                status_code: status,
                message,
            });
        }
    }
}
