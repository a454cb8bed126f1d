//! Error types for the Google Contacts provider

use bridge_traits::BridgeError;
use core_contacts::ContactsError;
use core_enrichment::EnrichmentError;
use core_identity::IdentityError;
use core_runtime::ErrorKind;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoogleContactsError {
    #[error("Account ID required for Google Contacts sync")]
    MissingAccount,

    #[error("No Google accounts connected")]
    NoAccounts,

    /// API request returned an error
    #[error("People API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The stored sync token is no longer accepted
    #[error("Sync token expired")]
    SyncTokenExpired,

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Contacts(#[from] ContactsError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

pub type Result<T> = std::result::Result<T, GoogleContactsError>;

impl GoogleContactsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GoogleContactsError::MissingAccount | GoogleContactsError::NoAccounts => {
                ErrorKind::Validation
            }
            GoogleContactsError::ApiError { status_code, .. } => match status_code {
                429 | 500..=599 => ErrorKind::Transient,
                401 | 403 => ErrorKind::Validation,
                404 => ErrorKind::NotFound,
                _ => ErrorKind::Internal,
            },
            GoogleContactsError::SyncTokenExpired | GoogleContactsError::Cancelled => {
                ErrorKind::Transient
            }
            GoogleContactsError::ParseError(_) => ErrorKind::Internal,
            GoogleContactsError::Bridge(BridgeError::CredentialsMissing(_)) => ErrorKind::Validation,
            GoogleContactsError::Bridge(e) if e.is_transient() => ErrorKind::Transient,
            GoogleContactsError::Bridge(_) => ErrorKind::Internal,
            GoogleContactsError::Contacts(e) => e.kind(),
            GoogleContactsError::Identity(e) => e.kind(),
            GoogleContactsError::Enrichment(e) => e.kind(),
        }
    }
}

impl From<GoogleContactsError> for SyncError {
    fn from(error: GoogleContactsError) -> Self {
        match error {
            GoogleContactsError::Cancelled => SyncError::Cancelled,
            other => SyncError::Provider {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}
