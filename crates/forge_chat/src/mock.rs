//! Scripted model for testing.
//!
//! Replies are served from a queue shared by every chat the model creates;
//! when the queue is empty an optional responder computes the reply from the
//! prompt. Every prompt is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, ChatResult};
use crate::model::{Chat, Model};
use crate::types::{Attachment, ChatListener, ChatMessage};

type Responder = dyn Fn(&str) -> ChatResult<String> + Send + Sync;

/// A queued reply.
pub enum ScriptedReply {
    Text(String),
    Fault(ChatError),
}

/// A prompt the model received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPrompt {
    /// Index of the chat session, in creation order.
    pub chat: usize,
    pub text: String,
    pub attachments: usize,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    prompts: Vec<RecordedPrompt>,
    chats: usize,
    sends: usize,
    cancel_at: Option<usize>,
}

/// Model with scripted replies.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
    responder: Option<Arc<Responder>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model that answers every prompt with `responder`.
    pub fn responding(responder: impl Fn(&str) -> ChatResult<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::default(),
            responder: Some(Arc::new(responder)),
        }
    }

    /// Queue a reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.script
            .lock()
            .replies
            .push_back(ScriptedReply::Text(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: ChatError) -> Self {
        self.script
            .lock()
            .replies
            .push_back(ScriptedReply::Fault(error));
        self
    }

    /// Cancel the caller's token while streaming the `n`th reply (1-based).
    pub fn cancel_on_send(self, n: usize) -> Self {
        self.script.lock().cancel_at = Some(n);
        self
    }

    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.script.lock().prompts.clone()
    }

    pub fn chats_created(&self) -> usize {
        self.script.lock().chats
    }

    fn next_reply(&self, text: &str) -> ChatResult<String> {
        let queued = self.script.lock().replies.pop_front();
        match queued {
            Some(ScriptedReply::Text(reply)) => Ok(reply),
            Some(ScriptedReply::Fault(error)) => Err(error),
            None => match &self.responder {
                Some(responder) => responder(text),
                None => Err(ChatError::Exhausted),
            },
        }
    }
}

impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_chat(&self, _output_thought: bool) -> Box<dyn Chat> {
        let index = {
            let mut script = self.script.lock();
            script.chats += 1;
            script.chats - 1
        };
        Box::new(ScriptedChat {
            model: self.clone(),
            index,
            history: Vec::new(),
        })
    }
}

struct ScriptedChat {
    model: ScriptedModel,
    index: usize,
    history: Vec<ChatMessage>,
}

#[async_trait]
impl Chat for ScriptedChat {
    async fn send(
        &mut self,
        text: &str,
        attachments: &[Attachment],
        listener: &mut dyn ChatListener,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let cancel_now = {
            let mut script = self.model.script.lock();
            script.sends += 1;
            script.prompts.push(RecordedPrompt {
                chat: self.index,
                text: text.to_string(),
                attachments: attachments.len(),
            });
            script.cancel_at == Some(script.sends)
        };

        let reply = self.model.next_reply(text)?;

        // Stream line by line so cancellation is observed between chunks.
        for chunk in reply.split_inclusive('\n') {
            if cancel_now {
                cancel.cancel();
            }
            if cancel.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            listener.on_content(chunk);
            tokio::task::yield_now().await;
        }

        self.history.push(ChatMessage::user(text));
        self.history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}
