//! Filesystem workspace compiler.
//!
//! Each workspace is a git repository under
//! `<root>/<application id>/<project>`. Builds and deploys run the module
//! type's shell commands inside it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use forge_core::Module;
use forge_patch::SourceFile;
use forge_templates::{ModuleType, ModuleTypeManifest};
use glob::Pattern;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::compiler::{BuildOutcome, Compiler, Deployment, WorkspaceKey, WorkspaceProvider};
use crate::error::{CompilerError, CompilerResult};
use crate::git::GitRepo;
use crate::shell::run_shell;

/// Where workspaces live and how deployed modules are addressed.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
    pub product_base_url: Option<String>,
    pub management_base_url: Option<String>,
    pub source_base_url: Option<String>,
}

impl WorkspaceSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    fn url(base: &Option<String>, key: &WorkspaceKey) -> Option<String> {
        base.as_ref().map(|base| {
            format!(
                "{}/{}/{}",
                base.trim_end_matches('/'),
                key.application_id,
                key.project
            )
        })
    }
}

/// Check that `path` stays inside the workspace.
fn relative_path(path: &str) -> CompilerResult<&Path> {
    let candidate = Path::new(path);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.trim().is_empty() || escapes {
        return Err(CompilerError::InvalidPath(path.to_string()));
    }
    Ok(candidate)
}

pub struct WorkspaceCompiler {
    key: WorkspaceKey,
    dir: PathBuf,
    manifest: ModuleTypeManifest,
    settings: Arc<WorkspaceSettings>,
    git: GitRepo,
}

impl WorkspaceCompiler {
    pub fn new(
        key: WorkspaceKey,
        manifest: ModuleTypeManifest,
        settings: Arc<WorkspaceSettings>,
    ) -> Self {
        let dir = settings.root.join(&key.application_id).join(&key.project);
        Self {
            git: GitRepo::new(&dir),
            key,
            dir,
            manifest,
            settings,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve every file against the workspace before touching the disk.
    async fn prepare(&self, files: &[SourceFile]) -> CompilerResult<Vec<(PathBuf, String)>> {
        let mut prepared = Vec::with_capacity(files.len());
        for file in files {
            let path = self.dir.join(relative_path(&file.path)?);
            let existing = if file.is_partial() {
                tokio::fs::read_to_string(&path).await.ok()
            } else {
                None
            };
            let content = file.resolve(existing.as_deref())?;
            prepared.push((path, content));
        }
        Ok(prepared)
    }

    async fn run_commands(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> CompilerResult<Result<String, String>> {
        let mut log = Vec::new();
        for command in commands {
            let result = run_shell(command, &self.dir, cancel).await?;
            let output = result.combined_output();
            if !result.success() {
                warn!(
                    "`{}` exited with {} in {}",
                    command, result.exit_code, self.key
                );
                log.push(output);
                return Ok(Err(log.join("\n")));
            }
            if !output.is_empty() {
                log.push(output);
            }
        }
        Ok(Ok(log.join("\n")))
    }
}

#[async_trait]
impl Compiler for WorkspaceCompiler {
    fn key(&self) -> &WorkspaceKey {
        &self.key
    }

    async fn run(
        &self,
        files: &[SourceFile],
        removed: &[String],
        cancel: &CancellationToken,
    ) -> CompilerResult<BuildOutcome> {
        self.git.init().await?;

        let prepared = match self.prepare(files).await {
            Ok(prepared) => prepared,
            Err(e @ (CompilerError::Patch(_) | CompilerError::InvalidPath(_))) => {
                return Ok(BuildOutcome::failure(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        for path in removed {
            let target = match relative_path(path) {
                Ok(rel) => self.dir.join(rel),
                Err(e) => return Ok(BuildOutcome::failure(e.to_string())),
            };
            if target.is_file() {
                debug!("Removing {}", target.display());
                tokio::fs::remove_file(&target).await?;
            }
        }

        for (path, content) in prepared {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await?;
        }

        info!("Building {} ({} files)", self.key, files.len());
        Ok(match self.run_commands(&self.manifest.commands.build, cancel).await? {
            Ok(output) => BuildOutcome::success(output),
            Err(output) => BuildOutcome::failure(output),
        })
    }

    async fn deploy(&self, cancel: &CancellationToken) -> CompilerResult<Deployment> {
        if !self.dir.exists() {
            return Err(CompilerError::WorkspaceNotFound(self.dir.clone()));
        }
        if let Err(output) = self
            .run_commands(&self.manifest.commands.deploy, cancel)
            .await?
        {
            return Err(CompilerError::CommandFailed {
                command: "deploy".to_string(),
                output,
            });
        }

        info!("Deployed {}", self.key);
        Ok(Deployment {
            product_url: WorkspaceSettings::url(&self.settings.product_base_url, &self.key),
            management_url: WorkspaceSettings::url(&self.settings.management_base_url, &self.key),
            source_url: WorkspaceSettings::url(&self.settings.source_base_url, &self.key),
        })
    }

    async fn commit(&self, message: &str) -> CompilerResult<()> {
        self.git.init().await?;
        self.git.commit_all(message).await?;
        Ok(())
    }

    async fn reset(&self, template_repo: Option<&str>, branch: &str) -> CompilerResult<()> {
        self.delete().await?;
        match template_repo {
            Some(repo) => self.git.clone_from(repo, branch).await,
            None => self.git.init().await,
        }
    }

    async fn discard(&self) -> CompilerResult<()> {
        if !self.git.is_initialized() {
            return Ok(());
        }
        self.git.discard().await
    }

    async fn revert(&self) -> CompilerResult<()> {
        if !self.git.is_initialized() {
            return Err(CompilerError::WorkspaceNotFound(self.dir.clone()));
        }
        info!("Reverting last commit of {}", self.key);
        self.git.revert_head().await
    }

    async fn source_files(&self) -> CompilerResult<Vec<SourceFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let patterns: Vec<Pattern> = self
            .manifest
            .source_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring source glob {}: {}", glob, e);
                    None
                }
            })
            .collect();

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            if !patterns.iter().any(|p| p.matches_path(rel)) {
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => files.push(SourceFile::new(
                    rel.to_string_lossy().replace('\\', "/"),
                    content,
                )),
                Err(e) => debug!("Skipping {}: {}", rel.display(), e),
            }
        }
        Ok(files)
    }

    async fn source_maps(&self) -> CompilerResult<Vec<SourceFile>> {
        let Some(output) = &self.manifest.source_map_dir else {
            return Ok(Vec::new());
        };
        let output = self.dir.join(relative_path(output)?);
        if !output.is_dir() {
            return Ok(Vec::new());
        }

        let mut maps = Vec::new();
        for entry in WalkDir::new(&output).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let is_map = entry.file_name().to_string_lossy().ends_with(".js.map");
            if !is_map || !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => maps.push(SourceFile::new(
                    rel.to_string_lossy().replace('\\', "/"),
                    content,
                )),
                Err(e) => warn!("Skipping source map {}: {}", rel.display(), e),
            }
        }
        debug!("Found {} source map(s) in {}", maps.len(), self.key);
        Ok(maps)
    }

    async fn delete(&self) -> CompilerResult<()> {
        if self.dir.exists() {
            info!("Deleting workspace {}", self.dir.display());
            tokio::fs::remove_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}

/// Provider of filesystem workspaces.
pub struct LocalWorkspaces {
    settings: Arc<WorkspaceSettings>,
    compilers: Mutex<HashMap<WorkspaceKey, Arc<WorkspaceCompiler>>>,
}

impl LocalWorkspaces {
    pub fn new(settings: WorkspaceSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            compilers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }
}

impl WorkspaceProvider for LocalWorkspaces {
    fn workspace(
        &self,
        application_id: &str,
        module: &Module,
        module_type: &ModuleType,
    ) -> Arc<dyn Compiler> {
        let key = WorkspaceKey::new(application_id, &module.project_name);
        let compiler = self
            .compilers
            .lock()
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(WorkspaceCompiler::new(
                    key,
                    module_type.manifest.clone(),
                    self.settings.clone(),
                ))
            })
            .clone();
        compiler
    }
}
