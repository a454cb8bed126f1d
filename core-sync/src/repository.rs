//! # Sync Repositories
//!
//! Persistence for sync states and sync logs.
//!
//! State transitions that must not race are single conditional `UPDATE`s:
//! [`SyncStateRepository::try_begin`] only succeeds when the row is not already
//! syncing, and [`SyncLogRepository::complete`] only succeeds on a running log.

use crate::error::{Result, SyncError};
use crate::state::{SyncLog, SyncLogCompletion, SyncLogStatus, SyncState, SyncStrategy};
use async_trait::async_trait;
use core_contacts::repositories::{Page, PageRequest};
use sqlx::{query, query_as, SqlitePool};
use uuid::Uuid;

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Fetch the state for `(source, account_id)`, creating an idle, enabled one if missing.
    async fn get_or_create(
        &self,
        source: &str,
        account_id: Option<&str>,
        strategy: SyncStrategy,
        now: i64,
    ) -> Result<SyncState>;

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncState>>;

    async fn find(&self, source: &str, account_id: Option<&str>) -> Result<Option<SyncState>>;

    async fn list_all(&self) -> Result<Vec<SyncState>>;

    /// Enabled, not syncing, and scheduled at or before `now` (never scheduled first).
    async fn list_due(&self, now: i64) -> Result<Vec<SyncState>>;

    /// Atomically move to `syncing`.
    ///
    /// Returns `None` when the state is already syncing or does not exist.
    async fn try_begin(&self, id: &str, now: i64) -> Result<Option<SyncState>>;

    /// Back to `idle`, clearing the error streak. `cursor` replaces the stored one when set.
    async fn record_success(
        &self,
        id: &str,
        cursor: Option<&str>,
        now: i64,
        next_sync_at: i64,
    ) -> Result<SyncState>;

    /// To `error`, extending the error streak by one.
    async fn record_failure(
        &self,
        id: &str,
        message: &str,
        now: i64,
        next_sync_at: i64,
    ) -> Result<SyncState>;

    /// Toggle scheduling. Leaves `status` untouched.
    async fn set_enabled(&self, id: &str, enabled: bool, now: i64) -> Result<SyncState>;

    /// Move states left in `syncing` by a previous process to `error`.
    async fn fail_interrupted(&self, message: &str, now: i64) -> Result<u64>;
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    /// Open a `running` log for a sync of `state`.
    async fn create(&self, state: &SyncState, now: i64) -> Result<SyncLog>;

    /// Close a running log. Fails with `LogNotFound` if it is unknown or already closed.
    async fn complete(
        &self,
        id: &str,
        status: SyncLogStatus,
        completion: &SyncLogCompletion,
        now: i64,
    ) -> Result<SyncLog>;

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncLog>>;

    /// Logs of one state, newest first.
    async fn list_for_state(&self, state_id: &str, page_request: PageRequest) -> Result<Page<SyncLog>>;

    /// Logs across all states, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<SyncLog>>;

    /// Delete completed logs started before `before`.
    async fn delete_before(&self, before: i64) -> Result<u64>;

    /// Close every log still running, as `error` with `message`.
    async fn fail_running(&self, message: &str, now: i64) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteSyncStateRepository {
    pool: SqlitePool,
}

impl SqliteSyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateRepository for SqliteSyncStateRepository {
    async fn get_or_create(
        &self,
        source: &str,
        account_id: Option<&str>,
        strategy: SyncStrategy,
        now: i64,
    ) -> Result<SyncState> {
        query(
            r#"
            INSERT INTO sync_states (
                id, source, account_id, account_key, enabled, status, strategy,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, 1, 'idle', ?, ?, ?)
            ON CONFLICT(source, account_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source)
        .bind(account_id)
        .bind(account_id.unwrap_or_default())
        .bind(strategy)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find(source, account_id)
            .await?
            .ok_or_else(|| SyncError::StateNotFound(format!("{}/{}", source, account_id.unwrap_or_default())))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncState>> {
        let state = query_as::<_, SyncState>("SELECT * FROM sync_states WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(state)
    }

    async fn find(&self, source: &str, account_id: Option<&str>) -> Result<Option<SyncState>> {
        let state = query_as::<_, SyncState>(
            "SELECT * FROM sync_states WHERE source = ? AND account_key = ?",
        )
        .bind(source)
        .bind(account_id.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn list_all(&self) -> Result<Vec<SyncState>> {
        let states = query_as::<_, SyncState>(
            "SELECT * FROM sync_states ORDER BY source ASC, account_key ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(states)
    }

    async fn list_due(&self, now: i64) -> Result<Vec<SyncState>> {
        let states = query_as::<_, SyncState>(
            r#"
            SELECT * FROM sync_states
            WHERE enabled = 1
              AND status <> 'syncing'
              AND (next_sync_at IS NULL OR next_sync_at <= ?)
            ORDER BY next_sync_at IS NOT NULL, next_sync_at ASC, rowid ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(states)
    }

    async fn try_begin(&self, id: &str, now: i64) -> Result<Option<SyncState>> {
        let state = query_as::<_, SyncState>(
            r#"
            UPDATE sync_states
            SET status = 'syncing', last_sync_at = ?, updated_at = ?
            WHERE id = ? AND status <> 'syncing'
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn record_success(
        &self,
        id: &str,
        cursor: Option<&str>,
        now: i64,
        next_sync_at: i64,
    ) -> Result<SyncState> {
        query_as::<_, SyncState>(
            r#"
            UPDATE sync_states
            SET status = 'idle',
                sync_cursor = COALESCE(?, sync_cursor),
                last_successful_sync_at = ?,
                next_sync_at = ?,
                error_message = NULL,
                error_count = 0,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(cursor)
        .bind(now)
        .bind(next_sync_at)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::StateNotFound(id.to_string()))
    }

    async fn record_failure(
        &self,
        id: &str,
        message: &str,
        now: i64,
        next_sync_at: i64,
    ) -> Result<SyncState> {
        query_as::<_, SyncState>(
            r#"
            UPDATE sync_states
            SET status = 'error',
                error_message = ?,
                error_count = error_count + 1,
                next_sync_at = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(message)
        .bind(next_sync_at)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::StateNotFound(id.to_string()))
    }

    async fn set_enabled(&self, id: &str, enabled: bool, now: i64) -> Result<SyncState> {
        query_as::<_, SyncState>(
            "UPDATE sync_states SET enabled = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(enabled)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::StateNotFound(id.to_string()))
    }

    async fn fail_interrupted(&self, message: &str, now: i64) -> Result<u64> {
        let result = query(
            r#"
            UPDATE sync_states
            SET status = 'error', error_message = ?, updated_at = ?
            WHERE status = 'syncing'
            "#,
        )
        .bind(message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

pub struct SqliteSyncLogRepository {
    pool: SqlitePool,
}

impl SqliteSyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl SyncLogRepository for SqliteSyncLogRepository {
    async fn create(&self, state: &SyncState, now: i64) -> Result<SyncLog> {
        let log = query_as::<_, SyncLog>(
            r#"
            INSERT INTO sync_logs (id, sync_state_id, source, account_id, started_at, status)
            VALUES (?, ?, ?, ?, ?, 'running')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&state.id)
        .bind(&state.source)
        .bind(&state.account_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn complete(
        &self,
        id: &str,
        status: SyncLogStatus,
        completion: &SyncLogCompletion,
        now: i64,
    ) -> Result<SyncLog> {
        query_as::<_, SyncLog>(
            r#"
            UPDATE sync_logs
            SET status = ?,
                completed_at = ?,
                items_processed = ?,
                items_matched = ?,
                items_created = ?,
                error_message = ?
            WHERE id = ? AND completed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(count(completion.items_processed))
        .bind(count(completion.items_matched))
        .bind(count(completion.items_created))
        .bind(&completion.error_message)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SyncError::LogNotFound(id.to_string()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncLog>> {
        let log = query_as::<_, SyncLog>("SELECT * FROM sync_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(log)
    }

    async fn list_for_state(&self, state_id: &str, page_request: PageRequest) -> Result<Page<SyncLog>> {
        let (total,): (i64,) = query_as("SELECT COUNT(*) FROM sync_logs WHERE sync_state_id = ?")
            .bind(state_id)
            .fetch_one(&self.pool)
            .await?;

        let logs = query_as::<_, SyncLog>(
            r#"
            SELECT * FROM sync_logs
            WHERE sync_state_id = ?
            ORDER BY started_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(state_id)
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(logs, total as u64, page_request))
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SyncLog>> {
        let logs = query_as::<_, SyncLog>(
            "SELECT * FROM sync_logs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn delete_before(&self, before: i64) -> Result<u64> {
        let result = query("DELETE FROM sync_logs WHERE started_at < ? AND completed_at IS NOT NULL")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn fail_running(&self, message: &str, now: i64) -> Result<u64> {
        let result = query(
            r#"
            UPDATE sync_logs
            SET status = 'error', completed_at = ?, error_message = ?
            WHERE completed_at IS NULL
            "#,
        )
        .bind(now)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
