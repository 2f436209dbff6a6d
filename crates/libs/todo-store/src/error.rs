use serde::{Deserialize, Serialize};

use crate::types::TodoId;

/// Errors returned by store operations.
///
/// Every variant carries a human-readable message. `Validation` is raised
/// before any state changes; the rest come back from the store itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("timeout: {operation}")]
    Timeout { operation: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Returns `true` for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// `NotFound` for a todo id.
    pub fn todo_not_found(id: TodoId) -> Self {
        Self::NotFound {
            resource: format!("todo {id}"),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}
