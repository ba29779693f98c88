//! Error types for the core module.

use thiserror::Error;

use crate::exchange::ExchangeStatus;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Exchange {0} was cancelled")]
    ExchangeCancelled(String),

    #[error("Exchange {0} is already running")]
    AlreadyRunning(String),

    #[error("Invalid exchange transition: {from} -> {to}")]
    InvalidTransition {
        from: ExchangeStatus,
        to: ExchangeStatus,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Circular dependency detected at module '{module}'")]
    CircularDependency { module: String },

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
