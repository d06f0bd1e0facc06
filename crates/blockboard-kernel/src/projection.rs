//! Chat-message projection.
//!
//! The chat message is a derived view of the document: every successful
//! update overwrites its blocks wholesale. [`ChatClient`] is the platform
//! seam; [`MessageProjection`] binds a client to one message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use blockboard_types::{Document, DocumentError, MessageRef};

/// Errors from the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} returned error: {error}")]
    Api { method: &'static str, error: String },

    #[error("message {0} not found")]
    MessageNotFound(MessageRef),

    #[error("malformed {method} response: {detail}")]
    MalformedResponse { method: &'static str, detail: String },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A chat platform that stores block-structured messages.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Read the current blocks of `message`.
    async fn read_message(&self, message: &MessageRef) -> Result<Document, ChatError>;

    /// Replace every block of `message` with `document`.
    async fn replace_message_blocks(
        &self,
        message: &MessageRef,
        document: &Document,
    ) -> Result<(), ChatError>;
}

/// Pushes documents to one chat message.
#[derive(Clone)]
pub struct MessageProjection {
    client: Arc<dyn ChatClient>,
    message: MessageRef,
}

impl MessageProjection {
    pub fn new(client: Arc<dyn ChatClient>, message: MessageRef) -> Self {
        Self { client, message }
    }

    pub fn message(&self) -> &MessageRef {
        &self.message
    }

    /// Overwrite the message with `document`.
    pub async fn project(&self, document: &Document) -> Result<(), ChatError> {
        debug!(message = %self.message, blocks = document.len(), "projecting document");
        self.client.replace_message_blocks(&self.message, document).await
    }
}

impl std::fmt::Debug for MessageProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProjection")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
