//! Message store error types.

use thiserror::Error;

/// Errors that can occur in the message store.
#[derive(Error, Debug)]
pub enum MessageStoreError {
    /// Message row does not exist (yet). Callers finalizing usage retry on
    /// this: the placeholder write can race the finalization.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Conversation does not exist.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}
