//! Git versioning of a module workspace.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{CompilerError, CompilerResult};

const IDENTITY: [&str; 4] = [
    "-c",
    "user.name=forge",
    "-c",
    "user.email=forge@localhost",
];

/// Git operations on one repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Check whether git is installed.
    pub fn is_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn is_initialized(&self) -> bool {
        self.path.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> CompilerResult<String> {
        let output = Command::new("git")
            .args(IDENTITY)
            .args(args)
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|e| CompilerError::Git(format!("Failed to run git {}: {}", args[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompilerError::Git(format!(
                "git {} failed: {}",
                args[0],
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Initialize the repository with an empty root commit.
    pub async fn init(&self) -> CompilerResult<()> {
        if self.is_initialized() {
            debug!("Repository already initialized");
            return Ok(());
        }

        info!("Initializing Git repository at {}", self.path.display());
        tokio::fs::create_dir_all(&self.path).await?;
        self.git(&["init"]).await?;
        self.git(&["commit", "--allow-empty", "-m", "Initialize workspace"])
            .await?;
        Ok(())
    }

    /// Shallow-clone `repo` at `branch` into this repository's path.
    pub async fn clone_from(&self, repo: &str, branch: &str) -> CompilerResult<()> {
        info!("Cloning {} ({}) into {}", repo, branch, self.path.display());
        let parent = self
            .path
            .parent()
            .ok_or_else(|| CompilerError::WorkspaceNotFound(self.path.clone()))?;
        tokio::fs::create_dir_all(parent).await?;

        let target = self.path.to_string_lossy().to_string();
        GitRepo::new(parent)
            .git(&["clone", "--depth", "1", "--branch", branch, repo, &target])
            .await?;
        Ok(())
    }

    pub async fn has_changes(&self) -> CompilerResult<bool> {
        Ok(!self.git(&["status", "--porcelain"]).await?.is_empty())
    }

    /// Stage everything and commit. Returns the new hash, or None when
    /// there was nothing to commit.
    pub async fn commit_all(&self, message: &str) -> CompilerResult<Option<String>> {
        if !self.has_changes().await? {
            debug!("Nothing to commit in {}", self.path.display());
            return Ok(None);
        }
        self.git(&["add", "-A"]).await?;
        self.git(&["commit", "-m", message]).await?;
        let hash = self.git(&["rev-parse", "HEAD"]).await?;
        debug!("Committed {}", hash);
        Ok(Some(hash))
    }

    /// Drop uncommitted changes, untracked files included.
    pub async fn discard(&self) -> CompilerResult<()> {
        self.git(&["reset", "--hard", "HEAD"]).await?;
        self.git(&["clean", "-fd"]).await?;
        Ok(())
    }

    pub async fn revert_head(&self) -> CompilerResult<()> {
        self.git(&["revert", "--no-edit", "HEAD"]).await?;
        Ok(())
    }

    pub async fn head_message(&self) -> CompilerResult<String> {
        self.git(&["log", "-1", "--format=%s"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_commit_discard_revert() {
        if !GitRepo::is_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::new(dir.path().join("ws"));
        repo.init().await.unwrap();
        assert!(repo.is_initialized());
        assert_eq!(repo.commit_all("empty").await.unwrap(), None);

        std::fs::write(dir.path().join("ws/a.txt"), "one").unwrap();
        assert!(repo.commit_all("add a").await.unwrap().is_some());
        assert_eq!(repo.head_message().await.unwrap(), "add a");

        std::fs::write(dir.path().join("ws/a.txt"), "two").unwrap();
        std::fs::write(dir.path().join("ws/b.txt"), "new").unwrap();
        repo.discard().await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("ws/a.txt")).unwrap(), "one");
        assert!(!dir.path().join("ws/b.txt").exists());

        repo.revert_head().await.unwrap();
        assert!(!dir.path().join("ws/a.txt").exists());
    }
}
