use bridge_traits::BridgeError;
use core_contacts::ContactsError;
use core_enrichment::EnrichmentError;
use core_identity::IdentityError;
use core_runtime::ErrorKind;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Contact store error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InitializationFailed(_) => ErrorKind::Internal,
            CoreError::CapabilityMissing { .. } => ErrorKind::Validation,
            CoreError::Runtime(e) => e.kind(),
            CoreError::Contacts(e) => e.kind(),
            CoreError::Identity(e) => e.kind(),
            CoreError::Enrichment(e) => e.kind(),
            CoreError::Sync(e) => e.kind(),
            CoreError::Bridge(BridgeError::CredentialsMissing(_)) => ErrorKind::Validation,
            CoreError::Bridge(e) if e.is_transient() => ErrorKind::Transient,
            CoreError::Bridge(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_source_error() {
        let err: CoreError = SyncError::SourceNotFound("nope".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: CoreError = core_runtime::Error::Config("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Configuration error: bad");
    }
}
