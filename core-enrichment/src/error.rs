use core_contacts::{ContactsError, MatchStatus};
use core_identity::IdentityError;
use core_runtime::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Contact store error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    #[error("Import candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Import candidate {id} cannot be imported: {reason}")]
    InvalidCandidate { id: String, reason: String },

    #[error("Import candidate {id} was already processed ({status})")]
    AlreadyProcessed { id: String, status: MatchStatus },
}

impl EnrichmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnrichmentError::Contacts(e) => e.kind(),
            EnrichmentError::Identity(e) => e.kind(),
            EnrichmentError::ContactNotFound(_) | EnrichmentError::CandidateNotFound(_) => {
                ErrorKind::NotFound
            }
            EnrichmentError::InvalidCandidate { .. } => ErrorKind::Validation,
            EnrichmentError::AlreadyProcessed { .. } => ErrorKind::Conflict,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichmentError>;
