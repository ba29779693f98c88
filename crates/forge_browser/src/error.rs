//! Error types for the browser test loop.

use forge_chat::ChatError;
use forge_templates::TemplateError;
use thiserror::Error;

/// Result type alias for browser operations.
pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element is not visible: {0}")]
    NotVisible(String),

    #[error("Expectation failed: {0}")]
    Expectation(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Page is closed")]
    Closed,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid source map: {0}")]
    InvalidSourceMap(String),

    #[error("Test cancelled")]
    Cancelled,

    #[error("Model error: {0}")]
    Chat(ChatError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ChatError> for BrowserError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Cancelled => BrowserError::Cancelled,
            other => BrowserError::Chat(other),
        }
    }
}
