//! Provider contract implemented once per external source.

use crate::error::Result;
use crate::state::{SyncState, SyncStrategy};
use async_trait::async_trait;
use core_contacts::Contact;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Static description of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry key, also stored on sync states and identities
    pub name: String,
    pub display_name: String,
    pub strategy: SyncStrategy,
    pub supports_multi_account: bool,
    pub supports_discovery: bool,
    /// Delay between successful runs
    pub default_interval: Duration,
}

/// Counters and cursor reported by a finished run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub items_processed: u64,
    pub items_matched: u64,
    pub items_created: u64,
    /// Items skipped after a per-item failure
    pub items_failed: u64,
    /// Replaces the stored cursor when set
    pub new_cursor: Option<String>,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait SyncProvider: Send + Sync {
    fn config(&self) -> SourceConfig;

    /// Run one sync for `state`.
    ///
    /// `contacts` is only populated for contact-driven providers. Long running
    /// work should check `cancel` between network calls.
    async fn sync(
        &self,
        cancel: &CancellationToken,
        state: &SyncState,
        contacts: &[Contact],
    ) -> Result<SyncResult>;

    /// Check that credentials exist for `account_id`, or for any account when `None`.
    async fn validate_credentials(&self, account_id: Option<&str>) -> Result<()>;
}
