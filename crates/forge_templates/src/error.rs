//! Error types for templates and module types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while loading module types or rendering prompts.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Module type not found: {0}")]
    NotFound(String),

    #[error("Invalid manifest in module type {module_type}: {message}")]
    InvalidManifest {
        module_type: String,
        message: String,
    },

    #[error("Prompt file not found: {0}")]
    PromptNotFound(PathBuf),

    #[error("Variable not provided: {0}")]
    MissingVariable(String),

    #[error("Prompt rendering failed: {0}")]
    RenderingFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
