//! # Sync Orchestrator
//!
//! Runs providers against their per source/account [`SyncState`].
//!
//! ## Workflow
//!
//! 1. Atomically move the state to `syncing` (a concurrent trigger gets `SyncInProgress`)
//! 2. Open a `running` [`SyncLog`]
//! 3. Preload contacts when the provider is contact-driven
//! 4. Run the provider, racing it against the cancellation token
//! 5. On success store the cursor and schedule the next run after the provider's interval
//! 6. On failure store the error and schedule a retry from the backoff ladder
//! 7. Complete the log, emit the lifecycle event
//!
//! Due states are processed one after another. A failing source is recorded and
//! skipped; the remaining sources still run.

use crate::backoff::backoff_delay;
use crate::error::{Result, SyncError};
use crate::provider::{SourceConfig, SyncProvider, SyncResult};
use crate::registry::SourceRegistry;
use crate::repository::{SyncLogRepository, SyncStateRepository};
use crate::state::{SyncLog, SyncLogCompletion, SyncLogStatus, SyncState};
use bridge_traits::time::Clock;
use core_contacts::repositories::{ContactRepository, Page, PageRequest};
use core_runtime::config::DEFAULT_CONTACT_PRELOAD_LIMIT;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const INTERRUPTED_MESSAGE: &str = "sync interrupted by shutdown";

pub struct SyncOrchestrator {
    registry: Arc<SourceRegistry>,
    states: Arc<dyn SyncStateRepository>,
    logs: Arc<dyn SyncLogRepository>,
    contacts: Arc<dyn ContactRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    contact_preload_limit: u32,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        states: Arc<dyn SyncStateRepository>,
        logs: Arc<dyn SyncLogRepository>,
        contacts: Arc<dyn ContactRepository>,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            states,
            logs,
            contacts,
            clock,
            event_bus,
            contact_preload_limit: DEFAULT_CONTACT_PRELOAD_LIMIT,
        }
    }

    /// Cap on contacts handed to contact-driven providers.
    pub fn with_contact_preload_limit(mut self, limit: u32) -> Self {
        self.contact_preload_limit = limit;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Sync one source/account now and wait for it to finish.
    ///
    /// Creates the state on first use. Returns the completed log on success.
    ///
    /// # Errors
    ///
    /// - `SourceNotFound` if no provider is registered under `source`
    /// - `SyncInProgress` if the state is already syncing
    /// - the provider's error, after it has been recorded on the state and the log
    #[instrument(skip(self, cancel))]
    pub async fn trigger_sync(
        &self,
        source: &str,
        account_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SyncLog> {
        let provider = self
            .registry
            .get(source)
            .ok_or_else(|| SyncError::SourceNotFound(source.to_string()))?;
        let config = provider.config();

        if account_id.is_some() && !config.supports_multi_account {
            debug!("Provider is single-account, syncing the given account anyway");
        }

        let state = self
            .states
            .get_or_create(source, account_id, config.strategy, self.clock.unix_timestamp())
            .await?;

        self.perform_sync(provider.as_ref(), &config, &state, cancel).await
    }

    /// Run every enabled state whose next run is due, one at a time.
    ///
    /// States without a registered provider are skipped with a warning. Returns
    /// how many syncs succeeded, or the error of the last one that failed.
    #[instrument(skip(self, cancel))]
    pub async fn run_due_syncs(&self, cancel: &CancellationToken) -> Result<usize> {
        let due = self.states.list_due(self.clock.unix_timestamp()).await?;
        if due.is_empty() {
            debug!("No syncs due");
            return Ok(0);
        }

        info!(count = due.len(), "Running due syncs");
        let mut succeeded = 0;
        let mut last_error = None;

        for state in due {
            if cancel.is_cancelled() {
                info!("Stopping due syncs, cancelled");
                break;
            }

            let Some(provider) = self.registry.get(&state.source) else {
                warn!(source = %state.source, "No provider registered for due sync, skipping");
                continue;
            };
            let config = provider.config();

            match self.perform_sync(provider.as_ref(), &config, &state, cancel).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    error!(source = %state.source, error = %e, "Sync failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(succeeded),
        }
    }

    /// Close out work a previous process left in `syncing` or `running`.
    ///
    /// Interrupted states become `error` and are picked up again by the scheduler.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let now = self.clock.unix_timestamp();
        let states = self.states.fail_interrupted(INTERRUPTED_MESSAGE, now).await?;
        let logs = self.logs.fail_running(INTERRUPTED_MESSAGE, now).await?;

        if states > 0 || logs > 0 {
            warn!(states, logs, "Recovered interrupted syncs");
        }
        Ok(states)
    }

    async fn perform_sync(
        &self,
        provider: &dyn SyncProvider,
        config: &SourceConfig,
        state: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<SyncLog> {
        let started_at = self.clock.unix_timestamp();
        let state = self
            .states
            .try_begin(&state.id, started_at)
            .await?
            .ok_or_else(|| SyncError::SyncInProgress {
                source_name: state.source.clone(),
                account_id: state.account_id.clone(),
            })?;

        info!(
            source = %state.source,
            strategy = %config.strategy,
            error_count = state.error_count,
            "Starting sync"
        );

        let log = match self.logs.create(&state, started_at).await {
            Ok(log) => log,
            Err(e) => {
                let message = format!("failed to create sync log: {}", e);
                self.record_failure(&state, None, &message).await;
                return Err(e);
            }
        };

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                sync_state_id: state.id.clone(),
                log_id: log.id.clone(),
                source: state.source.clone(),
                account_id: state.account_id.clone(),
            }))
            .ok();

        match self.run_provider(provider, config, &state, cancel).await {
            Ok(result) => self.record_success(&state, config, &log, result).await,
            Err(e) => {
                self.record_failure(&state, Some(&log), &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_provider(
        &self,
        provider: &dyn SyncProvider,
        config: &SourceConfig,
        state: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let contacts = if config.strategy.needs_contacts() {
            let contacts = self.contacts.list_with_methods(self.contact_preload_limit).await?;
            debug!(count = contacts.len(), "Preloaded contacts");
            contacts
        } else {
            Vec::new()
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = provider.sync(cancel, state, &contacts) => result,
        }
    }

    async fn record_success(
        &self,
        state: &SyncState,
        config: &SourceConfig,
        log: &SyncLog,
        result: SyncResult,
    ) -> Result<SyncLog> {
        let now = self.clock.unix_timestamp();
        let next_sync_at = now.saturating_add(seconds(config.default_interval));

        let status = if result.items_failed > 0 {
            SyncLogStatus::Partial
        } else {
            SyncLogStatus::Success
        };
        let completion = SyncLogCompletion {
            items_processed: result.items_processed,
            items_matched: result.items_matched,
            items_created: result.items_created,
            error_message: (result.items_failed > 0)
                .then(|| format!("{} items failed", result.items_failed)),
        };

        // the state must leave `syncing` even when the success write fails
        if let Err(e) = self
            .states
            .record_success(&state.id, result.new_cursor.as_deref(), now, next_sync_at)
            .await
        {
            let message = format!("failed to record sync success: {}", e);
            self.record_failure(state, Some(log), &message).await;
            return Err(e);
        }
        let completed = self.logs.complete(&log.id, status, &completion, now).await?;

        info!(
            source = %state.source,
            processed = result.items_processed,
            matched = result.items_matched,
            created = result.items_created,
            failed = result.items_failed,
            "Sync completed"
        );

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                sync_state_id: state.id.clone(),
                log_id: log.id.clone(),
                source: state.source.clone(),
                items_processed: result.items_processed,
                items_matched: result.items_matched,
                items_created: result.items_created,
                next_sync_at,
            }))
            .ok();

        Ok(completed)
    }

    /// Store the failure and schedule the retry. Never fails; storage errors are logged.
    async fn record_failure(&self, state: &SyncState, log: Option<&SyncLog>, message: &str) {
        let now = self.clock.unix_timestamp();
        let failures = state.consecutive_failures();
        let retry_at = now.saturating_add(seconds(backoff_delay(failures)));

        if let Err(e) = self
            .states
            .record_failure(&state.id, message, now, retry_at)
            .await
        {
            error!(source = %state.source, error = %e, "Failed to record sync failure");
        }

        if let Some(log) = log {
            if let Err(e) = self
                .logs
                .complete(&log.id, SyncLogStatus::Error, &SyncLogCompletion::failed(message), now)
                .await
            {
                error!(log_id = %log.id, error = %e, "Failed to complete sync log");
            }
        }

        warn!(
            source = %state.source,
            error_count = failures.saturating_add(1),
            retry_at,
            "Sync failed, retry scheduled"
        );

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                sync_state_id: state.id.clone(),
                source: state.source.clone(),
                message: message.to_string(),
                error_count: failures.saturating_add(1),
                retry_at,
            }))
            .ok();
    }

    // ------------------------------------------------------------------------
    // Management
    // ------------------------------------------------------------------------

    /// All sync states.
    pub async fn get_sync_status(&self) -> Result<Vec<SyncState>> {
        self.states.list_all().await
    }

    pub async fn get_sync_state(&self, source: &str, account_id: Option<&str>) -> Result<SyncState> {
        self.states
            .find(source, account_id)
            .await?
            .ok_or_else(|| SyncError::StateNotFound(format!("{}/{}", source, account_id.unwrap_or_default())))
    }

    pub async fn get_sync_state_by_id(&self, id: &str) -> Result<SyncState> {
        self.states
            .find_by_id(id)
            .await?
            .ok_or_else(|| SyncError::StateNotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn set_enabled(&self, state_id: &str, enabled: bool) -> Result<SyncState> {
        let state = self
            .states
            .set_enabled(state_id, enabled, self.clock.unix_timestamp())
            .await?;
        info!(source = %state.source, enabled, "Sync scheduling changed");
        Ok(state)
    }

    pub async fn get_sync_logs(&self, state_id: &str, page_request: PageRequest) -> Result<Page<SyncLog>> {
        self.logs.list_for_state(state_id, page_request).await
    }

    pub async fn recent_sync_logs(&self, limit: u32) -> Result<Vec<SyncLog>> {
        self.logs.recent(limit).await
    }

    pub fn available_providers(&self) -> Vec<SourceConfig> {
        self.registry.list()
    }

    /// Delete completed logs started before the Unix timestamp `before`.
    pub async fn delete_sync_logs_before(&self, before: i64) -> Result<u64> {
        let deleted = self.logs.delete_before(before).await?;
        debug!(deleted, before, "Deleted old sync logs");
        Ok(deleted)
    }

    pub async fn delete_sync_logs_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = self.clock.unix_timestamp().saturating_sub(seconds(age));
        self.delete_sync_logs_before(cutoff).await
    }

    /// Ask a provider whether it has credentials for `account_id`.
    pub async fn validate_credentials(&self, source: &str, account_id: Option<&str>) -> Result<()> {
        let provider = self
            .registry
            .get(source)
            .ok_or_else(|| SyncError::SourceNotFound(source.to_string()))?;
        provider.validate_credentials(account_id).await
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
