//! # Sync Orchestration
//!
//! Schedules and runs external sources against the contact store.
//!
//! ## Components
//!
//! - **Provider contract** (`provider`): what every source implements
//! - **Source Registry** (`registry`): catalogue of providers by name
//! - **Sync State** (`state`): per source/account state machine and audit logs
//! - **Repository** (`repository`): persistence for states and logs
//! - **Backoff** (`backoff`): retry ladder after failures
//! - **Orchestrator** (`orchestrator`): runs one or all due syncs
//! - **Scheduler** (`scheduler`): background task calling the orchestrator periodically

pub mod backoff;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod state;

pub use backoff::{backoff_delay, BACKOFF_LADDER};
pub use error::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use provider::{SourceConfig, SyncProvider, SyncResult};
pub use registry::SourceRegistry;
pub use repository::{
    SqliteSyncLogRepository, SqliteSyncStateRepository, SyncLogRepository, SyncStateRepository,
};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use state::{SyncLog, SyncLogCompletion, SyncLogStatus, SyncState, SyncStatus, SyncStrategy};
pub use tokio_util::sync::CancellationToken;
