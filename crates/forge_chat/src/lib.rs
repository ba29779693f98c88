//! # forge_chat
//!
//! The streaming model contract Forge talks to.
//!
//! A [`Model`] opens [`Chat`] sessions. Each `send` streams the reply through
//! a [`ChatListener`] and stops at the next chunk once its cancellation token
//! fires. [`HttpModel`] talks to OpenAI-compatible or Anthropic endpoints;
//! [`ScriptedModel`] serves canned replies for tests.

pub mod error;
pub mod http;
pub mod mock;
pub mod model;
pub mod retry;
pub mod sse;
pub mod types;

pub use error::{ChatError, ChatResult};
pub use http::{HttpModel, LlmProvider};
pub use mock::{RecordedPrompt, ScriptedModel, ScriptedReply};
pub use model::{Chat, Model};
pub use retry::{execute_with_retry, RetryError, RetryPolicy};
pub use types::{Attachment, ChatListener, ChatMessage, NoopListener, Role};
