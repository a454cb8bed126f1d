use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::CapabilityMissing { .. } => ErrorKind::Validation,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification every domain error maps onto.
///
/// Callers use this to decide between rejecting input, reporting a missing
/// entity, asking the user to retry later, or treating a write as best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input rejected before any state change.
    Validation,
    /// Unknown source, contact, identity or candidate.
    NotFound,
    /// Sync already running, or the entity is not in a state that allows the action.
    Conflict,
    /// Provider network or API failure. Retried through the backoff ladder.
    Transient,
    /// Database write or read failure.
    Persistence,
    /// Bug or invariant violation.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Persistence => "PERSISTENCE",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Persistence)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
