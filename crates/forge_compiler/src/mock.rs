//! Mock compiler for testing.
//!
//! Keeps files in memory, fails any build whose files contain a sentinel
//! string, and captures every call for verification.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use forge_core::Module;
use forge_patch::SourceFile;
use forge_templates::ModuleType;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::compiler::{BuildOutcome, Compiler, Deployment, WorkspaceKey, WorkspaceProvider};
use crate::error::{CompilerError, CompilerResult};

/// Content that makes the mock build fail.
pub const FAILURE_SENTINEL: &str = "Error";

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    /// Paths written by `run`.
    pub paths: Vec<String>,
    /// Paths removed by `run`, or the commit message.
    pub detail: Vec<String>,
}

impl CapturedCall {
    fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            paths: Vec::new(),
            detail: Vec::new(),
        }
    }
}

type Files = BTreeMap<String, String>;

#[derive(Clone)]
pub struct MockCompiler {
    key: WorkspaceKey,
    /// Working copy.
    files: Arc<RwLock<Files>>,
    /// Committed snapshots, oldest first.
    commits: Arc<RwLock<Vec<Files>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    always_fail: Arc<RwLock<bool>>,
    /// Build output, untouched by reset.
    source_maps: Arc<RwLock<Files>>,
}

impl MockCompiler {
    pub fn new(key: WorkspaceKey) -> Self {
        Self {
            key,
            files: Arc::new(RwLock::new(Files::new())),
            commits: Arc::new(RwLock::new(vec![Files::new()])),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            always_fail: Arc::new(RwLock::new(false)),
            source_maps: Arc::new(RwLock::new(Files::new())),
        }
    }

    /// Make every build fail.
    pub fn always_fail(self) -> Self {
        *self.always_fail.write() = true;
        self
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .write()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_source_map(self, path: &str, json: &str) -> Self {
        self.source_maps
            .write()
            .insert(path.to_string(), json.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.read().get(path).cloned()
    }

    pub fn captured_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Number of captured calls to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Commits made after the initial empty state.
    pub fn commit_count(&self) -> usize {
        self.commits.read().len() - 1
    }

    fn capture(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn snapshot(&self) -> Files {
        self.commits.read().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Compiler for MockCompiler {
    fn key(&self) -> &WorkspaceKey {
        &self.key
    }

    async fn run(
        &self,
        files: &[SourceFile],
        removed: &[String],
        cancel: &CancellationToken,
    ) -> CompilerResult<BuildOutcome> {
        self.capture(CapturedCall {
            method: "run".to_string(),
            paths: files.iter().map(|f| f.path.clone()).collect(),
            detail: removed.to_vec(),
        });
        if cancel.is_cancelled() {
            return Err(CompilerError::Cancelled);
        }

        let mut working = self.files.write();
        for path in removed {
            working.remove(path);
        }
        for file in files {
            let content = match file.resolve(working.get(&file.path).map(String::as_str)) {
                Ok(content) => content,
                Err(e) => return Ok(BuildOutcome::failure(e.to_string())),
            };
            working.insert(file.path.clone(), content);
        }

        if *self.always_fail.read() {
            return Ok(BuildOutcome::failure("error: build failed"));
        }
        let broken: Vec<&String> = working
            .iter()
            .filter(|(_, content)| content.contains(FAILURE_SENTINEL))
            .map(|(path, _)| path)
            .collect();
        if let Some(path) = broken.first() {
            return Ok(BuildOutcome::failure(format!(
                "{}:1: error: cannot compile {}",
                path, FAILURE_SENTINEL
            )));
        }
        Ok(BuildOutcome::success(format!("built {} files", working.len())))
    }

    async fn deploy(&self, _cancel: &CancellationToken) -> CompilerResult<Deployment> {
        self.capture(CapturedCall::new("deploy"));
        Ok(Deployment {
            product_url: Some(format!("http://localhost/{}", self.key)),
            management_url: None,
            source_url: None,
        })
    }

    async fn commit(&self, message: &str) -> CompilerResult<()> {
        let mut call = CapturedCall::new("commit");
        call.detail.push(message.to_string());
        self.capture(call);

        let working = self.files.read().clone();
        self.commits.write().push(working);
        Ok(())
    }

    async fn reset(&self, template_repo: Option<&str>, branch: &str) -> CompilerResult<()> {
        let mut call = CapturedCall::new("reset");
        call.detail = template_repo
            .into_iter()
            .map(str::to_string)
            .chain(std::iter::once(branch.to_string()))
            .collect();
        self.capture(call);

        self.files.write().clear();
        *self.commits.write() = vec![Files::new()];
        Ok(())
    }

    async fn discard(&self) -> CompilerResult<()> {
        self.capture(CapturedCall::new("discard"));
        *self.files.write() = self.snapshot();
        Ok(())
    }

    async fn revert(&self) -> CompilerResult<()> {
        self.capture(CapturedCall::new("revert"));
        let restored = {
            let mut commits = self.commits.write();
            if commits.len() > 1 {
                commits.pop();
            }
            commits.last().cloned().unwrap_or_default()
        };
        *self.files.write() = restored;
        Ok(())
    }

    async fn source_files(&self) -> CompilerResult<Vec<SourceFile>> {
        Ok(self
            .files
            .read()
            .iter()
            .map(|(path, content)| SourceFile::new(path.clone(), content.clone()))
            .collect())
    }

    async fn source_maps(&self) -> CompilerResult<Vec<SourceFile>> {
        Ok(self
            .source_maps
            .read()
            .iter()
            .map(|(path, json)| SourceFile::new(path.clone(), json.clone()))
            .collect())
    }

    async fn delete(&self) -> CompilerResult<()> {
        self.capture(CapturedCall::new("delete"));
        self.files.write().clear();
        Ok(())
    }
}

/// Provider of mock workspaces, kept so tests can inspect them.
#[derive(Clone, Default)]
pub struct MockWorkspaces {
    compilers: Arc<RwLock<HashMap<WorkspaceKey, MockCompiler>>>,
    always_fail: bool,
}

impl MockWorkspaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every workspace handed out fails its builds.
    pub fn always_fail(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Pre-register a workspace, e.g. one with existing files.
    pub fn with_compiler(self, compiler: MockCompiler) -> Self {
        self.compilers
            .write()
            .insert(compiler.key().clone(), compiler);
        self
    }

    pub fn get(&self, application_id: &str, project: &str) -> Option<MockCompiler> {
        self.compilers
            .read()
            .get(&WorkspaceKey::new(application_id, project))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.compilers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.compilers.read().is_empty()
    }
}

impl WorkspaceProvider for MockWorkspaces {
    fn workspace(
        &self,
        application_id: &str,
        module: &Module,
        _module_type: &ModuleType,
    ) -> Arc<dyn Compiler> {
        let key = WorkspaceKey::new(application_id, &module.project_name);
        let compiler = self
            .compilers
            .write()
            .entry(key.clone())
            .or_insert_with(|| {
                let compiler = MockCompiler::new(key);
                if self.always_fail {
                    compiler.always_fail()
                } else {
                    compiler
                }
            })
            .clone();
        Arc::new(compiler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> WorkspaceKey {
        WorkspaceKey::new("app", "api")
    }

    #[tokio::test]
    async fn test_sentinel_fails_build_until_fixed() {
        let compiler = MockCompiler::new(key());
        let cancel = CancellationToken::new();

        let broken = SourceFile::new("Foo.java", "class Foo { Error }");
        let outcome = compiler.run(&[broken], &[], &cancel).await.unwrap();
        assert!(!outcome.successful);
        assert!(outcome.output.contains("Foo.java"));

        let fixed = SourceFile::new("Foo.java", "class Foo {}");
        let outcome = compiler.run(&[fixed], &[], &cancel).await.unwrap();
        assert!(outcome.successful);
        assert_eq!(compiler.call_count("run"), 2);
    }

    #[tokio::test]
    async fn test_always_fail() {
        let compiler = MockCompiler::new(key()).always_fail();
        let cancel = CancellationToken::new();
        let outcome = compiler
            .run(&[SourceFile::new("Foo.java", "class Foo {}")], &[], &cancel)
            .await
            .unwrap();
        assert!(!outcome.successful);
    }

    #[tokio::test]
    async fn test_commit_discard_revert() {
        let compiler = MockCompiler::new(key());
        let cancel = CancellationToken::new();

        compiler
            .run(&[SourceFile::new("a", "1")], &[], &cancel)
            .await
            .unwrap();
        compiler.commit("first").await.unwrap();
        compiler
            .run(&[SourceFile::new("a", "2")], &[], &cancel)
            .await
            .unwrap();
        compiler.discard().await.unwrap();
        assert_eq!(compiler.file("a").as_deref(), Some("1"));

        compiler.revert().await.unwrap();
        assert_eq!(compiler.file("a"), None);
        assert_eq!(compiler.commit_count(), 0);
    }

    #[test]
    fn test_provider_shares_state_per_key() {
        let provider = MockWorkspaces::new();
        let module_type = ModuleType::kiwi();
        let api = Module::new("api", forge_core::Technology::Kiwi);

        provider.workspace("app", &api, &module_type);
        provider.workspace("app", &api, &module_type);
        assert_eq!(provider.len(), 1);
        assert!(provider.get("app", "api").is_some());
    }
}
