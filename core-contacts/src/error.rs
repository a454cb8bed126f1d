use core_runtime::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ContactsError {
    pub fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        ContactsError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ContactsError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ContactsError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                ErrorKind::Conflict
            }
            ContactsError::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            ContactsError::Database(_) | ContactsError::Migration(_) => ErrorKind::Persistence,
            ContactsError::NotFound { .. } => ErrorKind::NotFound,
            ContactsError::InvalidInput { .. } => ErrorKind::Validation,
            ContactsError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ContactsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ContactsError::not_found("Contact", "c-1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ContactsError::invalid("full_name", "empty").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ContactsError::Database(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Persistence
        );
    }
}
