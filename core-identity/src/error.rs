use core_contacts::ContactsError;
use core_runtime::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Contact store error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Contact not found: {0}")]
    ContactNotFound(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::Database(_) => ErrorKind::Persistence,
            IdentityError::Contacts(e) => e.kind(),
            IdentityError::InvalidIdentifier(_) => ErrorKind::Validation,
            IdentityError::IdentityNotFound(_) | IdentityError::ContactNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
