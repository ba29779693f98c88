//! Error types for model and chat calls.

use std::fmt;

/// Model/chat errors
#[derive(Debug)]
pub enum ChatError {
    /// No model is configured
    NotConfigured,
    /// Transport failure before a response arrived
    Request(String),
    /// Non-success HTTP status from the provider
    Api { status: u16, body: String },
    /// Failure while reading the response stream
    Stream(String),
    /// The stream ended without any content
    EmptyResponse,
    /// The caller cancelled the call
    Cancelled,
    /// A scripted model ran out of replies
    Exhausted,
    /// File system error
    IoError(std::io::Error),
    /// Serialization error
    SerializationError(String),
}

impl ChatError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Stream(_) | Self::EmptyResponse => true,
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(
                f,
                "LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY"
            ),
            Self::Request(msg) => write!(f, "Network error: {}", msg),
            Self::Api { status, body } => write!(f, "LLM API error {}: {}", status, body),
            Self::Stream(msg) => write!(f, "Stream read error: {}", msg),
            Self::EmptyResponse => write!(f, "LLM returned an empty response"),
            Self::Cancelled => write!(f, "Chat cancelled"),
            Self::Exhausted => write!(f, "Scripted model has no more replies"),
            Self::IoError(e) => write!(f, "I/O error: {}", e),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChatError::Request("reset".into()).is_transient());
        assert!(ChatError::Api { status: 429, body: String::new() }.is_transient());
        assert!(ChatError::Api { status: 503, body: String::new() }.is_transient());
        assert!(!ChatError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!ChatError::Cancelled.is_transient());
        assert!(!ChatError::NotConfigured.is_transient());
    }
}
