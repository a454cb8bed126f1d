use core_contacts::ContactsError;
use core_runtime::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Contact store error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Unknown sync source: {0}")]
    SourceNotFound(String),

    #[error("Sync state {0} not found")]
    StateNotFound(String),

    #[error("Sync log {0} not found or already completed")]
    LogNotFound(String),

    #[error("Sync already in progress for {source_name}")]
    SyncInProgress { source_name: String, account_id: Option<String> },

    #[error("Provider error: {message}")]
    Provider { kind: ErrorKind, message: String },

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// A provider failure that the backoff ladder retries.
    pub fn transient(message: impl Into<String>) -> Self {
        SyncError::Provider {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    /// A provider failure caused by its input, such as a missing account.
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Provider {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Database(_) => ErrorKind::Persistence,
            SyncError::Contacts(e) => e.kind(),
            SyncError::SourceNotFound(_) | SyncError::StateNotFound(_) | SyncError::LogNotFound(_) => {
                ErrorKind::NotFound
            }
            SyncError::SyncInProgress { .. } => ErrorKind::Conflict,
            SyncError::Provider { kind, .. } => *kind,
            SyncError::Cancelled => ErrorKind::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
