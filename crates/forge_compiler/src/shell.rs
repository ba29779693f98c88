//! Shell command execution inside a workspace.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CompilerError, CompilerResult};

/// Output of one command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `command` through `sh -c` in `dir`. The child is killed on cancellation.
pub async fn run_shell(
    command: &str,
    dir: &Path,
    cancel: &CancellationToken,
) -> CompilerResult<ExecutionResult> {
    debug!("Running `{}` in {}", command, dir.display());

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CompilerError::CommandFailed {
            command: command.to_string(),
            output: e.to_string(),
        })?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CompilerError::Cancelled),
        output = child.wait_with_output() => output?,
    };

    Ok(ExecutionResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_exit_code_and_output() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();

        let ok = run_shell("echo built", dir.path(), &cancel).await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.combined_output(), "built");

        let failed = run_shell("echo oops >&2; exit 3", dir.path(), &cancel)
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.combined_output(), "oops");
    }

    #[tokio::test]
    async fn test_cancelled_command() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_shell("sleep 5", dir.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, CompilerError::Cancelled));
    }
}
