//! Module workspaces for forge.
//!
//! A [`Compiler`] owns the workspace of one module of one application:
//! generated files are written to it, built and deployed with the module
//! type's commands, and versioned with git so that a finished exchange can
//! be reverted. [`LocalWorkspaces`] hands out filesystem compilers;
//! [`MockWorkspaces`] keeps everything in memory for tests.

pub mod compiler;
pub mod error;
pub mod git;
pub mod mock;
pub mod shell;
pub mod workspace;

pub use compiler::{BuildOutcome, Compiler, Deployment, WorkspaceKey, WorkspaceProvider};
pub use error::{CompilerError, CompilerResult};
pub use git::GitRepo;
pub use mock::{CapturedCall, MockCompiler, MockWorkspaces, FAILURE_SENTINEL};
pub use shell::{run_shell, ExecutionResult};
pub use workspace::{LocalWorkspaces, WorkspaceCompiler, WorkspaceSettings};
