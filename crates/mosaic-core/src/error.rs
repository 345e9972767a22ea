use thiserror::Error;

use crate::repositories::RepositoryError;
use crate::services::BackendError;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Generation failed: {0}")]
    Backend(#[from] BackendError),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Backend failures may be retried by the user; nothing else can.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
