//! In-memory access token table.

use async_trait::async_trait;
use bridge_traits::{
    auth::AccessTokenProvider,
    error::{BridgeError, Result},
};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Token provider fed by the host.
///
/// The host owns the OAuth flow and refresh schedule and calls
/// [`set_token`](Self::set_token) whenever a token changes.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: RwLock<BTreeMap<String, String>>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, account_id: impl Into<String>, token: impl Into<String>) {
        self.tokens.write().insert(account_id.into(), token.into());
    }

    pub fn remove_account(&self, account_id: &str) -> bool {
        self.tokens.write().remove(account_id).is_some()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self, account_id: &str) -> Result<String> {
        self.tokens
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| BridgeError::CredentialsMissing(account_id.to_string()))
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        Ok(self.tokens.read().keys().cloned().collect())
    }
}
