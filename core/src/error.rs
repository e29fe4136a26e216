use crate::status::RequestStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("User directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Cannot {action} a {from} request: {reason}")]
    TransitionRefused {
        from: RequestStatus,
        action: &'static str,
        reason: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Assignments for manager '{manager_id}' changed: expected version {expected}, found {actual}")]
    VersionConflict {
        manager_id: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PortalError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
