//! Error types for context management

use thiserror::Error;
use threadline_runtime::ServiceError;

/// Context management error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Message must not be empty")]
    EmptyInput,

    /// The primary completion failed; conversation state is unchanged.
    #[error("Completion failed: {0}")]
    Completion(#[source] ServiceError),

    /// The turn was recorded but folding old turns into the summary failed.
    #[error("Compression failed: {0}")]
    Compression(#[source] ServiceError),

    #[error("Completion cancelled")]
    Cancelled,
}

impl ContextError {
    /// The underlying service error, if the failure came from the provider.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Completion(err) | Self::Compression(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
