//! Error types for the conversational engine.

use hearth_core::error::HearthError;

/// Errors from the chat engine.
///
/// Only the input-validation variants ever escape
/// [`ChatOrchestrator::handle_turn`](crate::ChatOrchestrator::handle_turn);
/// everything else is degraded into a reply inside the turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("full-text index error: {0}")]
    Index(String),
    #[error("composer error: {0}")]
    Composer(String),
    #[error("composer timed out after {0} ms")]
    ComposerTimeout(u64),
}

impl From<HearthError> for ChatError {
    fn from(err: HearthError) -> Self {
        match err {
            HearthError::Search(msg) => ChatError::Index(msg),
            other => ChatError::Catalog(other.to_string()),
        }
    }
}
