//! # Sync State Machine
//!
//! Per source/account scheduling state and the audit log of sync attempts.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──→ Syncing ──→ Idle   (success)
//!   ↑         │
//!   │         └──────→ Error  (failure, retried after backoff)
//!   └──────────────────┘
//! ```
//!
//! `enabled` is an independent flag: disabling a source leaves its status as it was,
//! it only stops the scheduler from picking the state up.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Disabled,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Disabled => "disabled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncStatus::Idle),
            "syncing" => Ok(SyncStatus::Syncing),
            "error" => Ok(SyncStatus::Error),
            "disabled" => Ok(SyncStatus::Disabled),
            other => Err(format!("unknown sync status: {}", other)),
        }
    }
}

/// How a provider finds the data it syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// The provider is handed the contact list and queries per contact
    ContactDriven,
    /// The provider pulls everything and discovers identifiers
    FetchAll,
    /// The provider pulls a filtered subset and discovers identifiers
    FetchFiltered,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::ContactDriven => "contact_driven",
            SyncStrategy::FetchAll => "fetch_all",
            SyncStrategy::FetchFiltered => "fetch_filtered",
        }
    }

    pub fn needs_contacts(&self) -> bool {
        matches!(self, SyncStrategy::ContactDriven)
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact_driven" => Ok(SyncStrategy::ContactDriven),
            "fetch_all" => Ok(SyncStrategy::FetchAll),
            "fetch_filtered" => Ok(SyncStrategy::FetchFiltered),
            other => Err(format!("unknown sync strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Running,
    Success,
    /// Completed, but some items failed and were skipped
    Partial,
    Error,
}

impl SyncLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncLogStatus::Running => "running",
            SyncLogStatus::Success => "success",
            SyncLogStatus::Partial => "partial",
            SyncLogStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncLogStatus::Running)
    }
}

impl fmt::Display for SyncLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Scheduling state for one `(source, account)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SyncState {
    pub id: String,
    pub source: String,
    pub account_id: Option<String>,
    pub enabled: bool,
    pub status: SyncStatus,
    pub strategy: SyncStrategy,
    /// Opaque provider bookmark for incremental runs
    pub sync_cursor: Option<String>,
    pub last_sync_at: Option<i64>,
    pub last_successful_sync_at: Option<i64>,
    pub next_sync_at: Option<i64>,
    pub error_message: Option<String>,
    /// Consecutive failures since the last success
    pub error_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncState {
    /// Whether the scheduler should run this state at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.enabled
            && !self.status.is_active()
            && self.next_sync_at.map_or(true, |at| at <= now)
    }

    pub fn consecutive_failures(&self) -> u32 {
        u32::try_from(self.error_count).unwrap_or(u32::MAX)
    }
}

/// Audit row for one sync attempt. Completed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SyncLog {
    pub id: String,
    pub sync_state_id: String,
    pub source: String,
    pub account_id: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub status: SyncLogStatus,
    pub items_processed: i64,
    pub items_matched: i64,
    pub items_created: i64,
    pub error_message: Option<String>,
}

impl SyncLog {
    pub fn duration_secs(&self) -> Option<i64> {
        self.completed_at.map(|done| done - self.started_at)
    }
}

/// Final figures written when a log is completed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncLogCompletion {
    pub items_processed: u64,
    pub items_matched: u64,
    pub items_created: u64,
    pub error_message: Option<String>,
}

impl SyncLogCompletion {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}
