//! Error types for module workspaces.

use std::path::PathBuf;

use forge_patch::PatchError;
use thiserror::Error;

/// Result type alias for compiler operations.
pub type CompilerResult<T> = Result<T, CompilerError>;

/// Errors raised by a workspace.
///
/// A failing build is not an error: it is reported through
/// [`crate::BuildOutcome`] so the caller can feed the output to a fix round.
#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("Git error: {0}")]
    Git(String),

    #[error("Command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(PathBuf),

    #[error("Path escapes the workspace: {0}")]
    InvalidPath(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
