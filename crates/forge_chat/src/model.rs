//! The streaming model/chat contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ChatResult;
use crate::types::{Attachment, ChatListener, ChatMessage};

/// A multi-turn chat session with a model.
#[async_trait]
pub trait Chat: Send {
    /// Send a user message and stream the reply.
    ///
    /// Chunks are passed to `listener` as they arrive. The call stops with
    /// `ChatError::Cancelled` as soon as `cancel` fires, checked between chunks.
    async fn send(
        &mut self,
        text: &str,
        attachments: &[Attachment],
        listener: &mut dyn ChatListener,
        cancel: &CancellationToken,
    ) -> ChatResult<String>;

    /// Turns exchanged so far.
    fn history(&self) -> &[ChatMessage];
}

/// Factory for chat sessions.
pub trait Model: Send + Sync {
    /// Model identifier, for logging.
    fn name(&self) -> &str;

    /// Open a new session. With `output_thought`, reasoning chunks are streamed too.
    fn create_chat(&self, output_thought: bool) -> Box<dyn Chat>;
}
