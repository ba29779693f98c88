//! Data manipulation tasks.
//!
//! The model writes a data script for a module; a [`DataAgent`] applies it.
//! Failures are fed back through the same fix loop as code generation.

use async_trait::async_trait;
use forge_compiler::{BuildOutcome, Compiler, CompilerResult};
use forge_patch::Patch;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[async_trait]
pub trait DataAgent: Send + Sync {
    /// Apply `script` to the module's data. An unsuccessful outcome is
    /// retried with a fix prompt.
    async fn apply(
        &self,
        compiler: &dyn Compiler,
        script: &Patch,
        cancel: &CancellationToken,
    ) -> CompilerResult<BuildOutcome>;
}

/// Writes the script into the module workspace and runs the module build,
/// which is expected to execute it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceDataAgent;

#[async_trait]
impl DataAgent for WorkspaceDataAgent {
    async fn apply(
        &self,
        compiler: &dyn Compiler,
        script: &Patch,
        cancel: &CancellationToken,
    ) -> CompilerResult<BuildOutcome> {
        info!(
            "Applying data script to {} ({} file(s))",
            compiler.key(),
            script.added.len()
        );
        compiler.run(&script.added, &script.removed, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_compiler::{MockCompiler, WorkspaceKey};
    use forge_patch::SourceFile;

    #[tokio::test]
    async fn test_script_is_written_and_built() {
        let compiler = MockCompiler::new(WorkspaceKey::new("app", "api"));
        let script = Patch {
            added: vec![SourceFile::new("data/seed.sql", "insert into todo values (1);")],
            removed: Vec::new(),
        };
        let outcome = WorkspaceDataAgent
            .apply(&compiler, &script, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.successful);
        assert!(compiler.file("data/seed.sql").is_some());
    }
}
