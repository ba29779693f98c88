//! Error types for patch parsing and application.

use thiserror::Error;

/// Result type alias for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors that can occur while parsing or applying a patch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Malformed header. `position` is the 1-based character offset in the parsed input.
    #[error("{message} at position {position}: {text}")]
    Parse {
        message: String,
        text: String,
        position: usize,
    },

    #[error("Cannot apply patch: {0}")]
    Apply(String),

    /// Files the format cannot represent without changing them.
    #[error("Cannot render patch: {0}")]
    Render(String),
}

impl PatchError {
    pub fn parse(message: impl Into<String>, text: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            text: text.into(),
            position,
        }
    }

    /// Character position of a parse fault.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Parse { position, .. } => Some(*position),
            Self::Apply(_) | Self::Render(_) => None,
        }
    }
}
