//! Error types for the conversational interface.

use carcare_core::error::CarCareError;

/// Errors from the chat service.
///
/// Completion-provider failures never appear here: they are absorbed into a
/// degraded reply at the gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("conversation must contain at least one message")]
    EmptyConversation,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<CarCareError> for ChatError {
    fn from(err: CarCareError) -> Self {
        ChatError::StorageError(err.to_string())
    }
}
