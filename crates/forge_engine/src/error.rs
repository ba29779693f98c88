//! Error types for the generation engine.

use forge_browser::BrowserError;
use forge_chat::ChatError;
use forge_compiler::CompilerError;
use forge_core::{CoreError, ExchangeId};
use forge_patch::PatchError;
use forge_templates::TemplateError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors.
///
/// Build and test failures of generated code drive the fix loop and only
/// surface as `GenerationFailed` once the attempt bound is exhausted. Model
/// and transport faults surface as `AgentFailed` once backoff is exhausted.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Generation of module {module} failed after {attempts} attempts: {last_error}")]
    GenerationFailed {
        module: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Agent for {module} failed after {attempts} tries: {message}")]
    AgentFailed {
        module: String,
        attempts: u32,
        message: String,
    },

    #[error("Exchange cancelled: {0}")]
    Cancelled(ExchangeId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(CoreError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Workspace error: {0}")]
    Compiler(CompilerError),

    #[error("Browser error: {0}")]
    Browser(BrowserError),

    #[error("Model error: {0}")]
    Chat(ChatError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }
}

// Cancellation raised below the engine does not know the exchange id; the
// orchestrator fills it in before reporting.

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ExchangeCancelled(id) => EngineError::Cancelled(id),
            other => EngineError::Core(other),
        }
    }
}

impl From<CompilerError> for EngineError {
    fn from(err: CompilerError) -> Self {
        match err {
            CompilerError::Cancelled => EngineError::Cancelled(ExchangeId::new()),
            other => EngineError::Compiler(other),
        }
    }
}

impl From<BrowserError> for EngineError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Cancelled => EngineError::Cancelled(ExchangeId::new()),
            other => EngineError::Browser(other),
        }
    }
}

impl From<ChatError> for EngineError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Cancelled => EngineError::Cancelled(ExchangeId::new()),
            other => EngineError::Chat(other),
        }
    }
}
