//! Credential access for providers that sync per connected account.
//!
//! Token storage, encryption and refresh live in the host. The core only asks
//! for a usable bearer token when it is about to call a remote API.

use async_trait::async_trait;

use crate::error::Result;

/// Source of OAuth access tokens keyed by account.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a valid (refreshed if necessary) access token for `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CredentialsMissing`](crate::error::BridgeError::CredentialsMissing)
    /// when the account is not connected.
    async fn access_token(&self, account_id: &str) -> Result<String>;

    /// List connected account identifiers.
    async fn accounts(&self) -> Result<Vec<String>>;
}
