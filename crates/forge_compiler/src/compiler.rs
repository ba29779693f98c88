//! Compiler contract.
//!
//! A compiler owns one module workspace: it receives generated files, builds
//! and deploys them, and versions the result so a run can be rolled back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use forge_core::Module;
use forge_patch::SourceFile;
use forge_templates::ModuleType;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::CompilerResult;

/// Identifies a workspace: one per (application, module project) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceKey {
    pub application_id: String,
    pub project: String,
}

impl WorkspaceKey {
    pub fn new(application_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_id, self.project)
    }
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub successful: bool,
    /// Raw build output; on failure this is what the fix prompt receives.
    pub output: String,
}

impl BuildOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            successful: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            successful: false,
            output: output.into(),
        }
    }
}

/// Where a deployed module can be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub product_url: Option<String>,
    pub management_url: Option<String>,
    pub source_url: Option<String>,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    fn key(&self) -> &WorkspaceKey;

    /// Write `files`, delete `removed`, then build.
    ///
    /// Partial files (hunks) are applied to the current content. A hunk that
    /// does not apply is reported as a failed build, not as an error.
    async fn run(
        &self,
        files: &[SourceFile],
        removed: &[String],
        cancel: &CancellationToken,
    ) -> CompilerResult<BuildOutcome>;

    async fn deploy(&self, cancel: &CancellationToken) -> CompilerResult<Deployment>;

    /// Record the current content as the stable baseline.
    async fn commit(&self, message: &str) -> CompilerResult<()>;

    /// Recreate the workspace from a template repository, or empty.
    async fn reset(&self, template_repo: Option<&str>, branch: &str) -> CompilerResult<()>;

    /// Drop changes made since the last commit.
    async fn discard(&self) -> CompilerResult<()>;

    /// Undo the last commit.
    async fn revert(&self) -> CompilerResult<()>;

    async fn source_files(&self) -> CompilerResult<Vec<SourceFile>>;

    /// `*.js.map` files of the last build, keyed by workspace-relative path.
    async fn source_maps(&self) -> CompilerResult<Vec<SourceFile>>;

    async fn delete(&self) -> CompilerResult<()>;
}

/// Hands out the compiler of each workspace.
///
/// Repeated calls for the same key return the same compiler.
pub trait WorkspaceProvider: Send + Sync {
    fn workspace(
        &self,
        application_id: &str,
        module: &Module,
        module_type: &ModuleType,
    ) -> Arc<dyn Compiler>;
}
