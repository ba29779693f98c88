//! Module-type manifests.
//!
//! A module type describes how modules of one technology are scaffolded,
//! built, deployed and prompted. Types are data-driven through
//! `module-type.yaml` files rather than hard-coded.

use std::collections::HashMap;
use std::path::PathBuf;

use forge_core::Technology;
use serde::{Deserialize, Serialize};

use crate::prompts::PromptKind;

/// Build and deploy commands, run through the shell in the module workspace.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CommandSpec {
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub deploy: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_source_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

/// Manifest for a module type (module-type.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTypeManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub technology: Technology,
    /// Repository the module workspace is reset from.
    #[serde(default)]
    pub template_repo: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Whether generated modules go through the browser test loop.
    #[serde(default)]
    pub testable: bool,
    #[serde(default)]
    pub commands: CommandSpec,
    /// Files shown to the model as the module's source.
    #[serde(default = "default_source_globs")]
    pub source_globs: Vec<String>,
    /// Build output directory holding `*.js.map` files, relative to the workspace.
    #[serde(default)]
    pub source_map_dir: Option<String>,
    /// Prompt overrides: prompt kind -> file relative to the manifest.
    #[serde(default)]
    pub prompts: HashMap<PromptKind, String>,
}

impl ModuleTypeManifest {
    pub fn new(id: impl Into<String>, technology: Technology) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            technology,
            template_repo: None,
            branch: default_branch(),
            testable: false,
            commands: CommandSpec::default(),
            source_globs: default_source_globs(),
            source_map_dir: None,
            prompts: HashMap::new(),
        }
    }

    pub fn testable(mut self) -> Self {
        self.testable = true;
        self
    }

    pub fn with_source_globs(mut self, globs: &[&str]) -> Self {
        self.source_globs = globs.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Check the manifest for problems.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push("id must not be empty".to_string());
        }
        if self.source_globs.is_empty() {
            issues.push("source_globs must list at least one pattern".to_string());
        }
        if self.template_repo.is_some() && self.branch.trim().is_empty() {
            issues.push("branch must be set when template_repo is".to_string());
        }
        issues
    }
}

/// A loaded module type: manifest plus resolved prompt texts.
#[derive(Debug, Clone)]
pub struct ModuleType {
    pub manifest: ModuleTypeManifest,
    /// Directory the manifest was loaded from; None for built-ins.
    pub path: Option<PathBuf>,
    prompts: HashMap<PromptKind, String>,
}

impl ModuleType {
    pub fn new(manifest: ModuleTypeManifest, path: Option<PathBuf>) -> Self {
        Self {
            manifest,
            path,
            prompts: HashMap::new(),
        }
    }

    pub fn with_prompt(mut self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.prompts.insert(kind, text.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn is_testable(&self) -> bool {
        self.manifest.testable
    }

    /// Prompt text for `kind`, falling back to the built-in library.
    pub fn prompt(&self, kind: PromptKind) -> &str {
        self.prompts
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_text())
    }

    /// Built-in backend type.
    pub fn kiwi() -> Self {
        let mut manifest = ModuleTypeManifest::new("kiwi", Technology::Kiwi)
            .with_source_globs(&["src/**/*.java", "pom.xml"]);
        manifest.name = "Kiwi backend".to_string();
        manifest.description = "Server-side module exposing an HTTP API".to_string();
        Self::new(manifest, None)
    }

    /// Built-in UI type. Web modules are exercised by the browser test loop.
    pub fn web() -> Self {
        let mut manifest = ModuleTypeManifest::new("web", Technology::Web)
            .testable()
            .with_source_globs(&["src/**/*", "index.html", "package.json"]);
        manifest.name = "Web UI".to_string();
        manifest.description = "Browser front end".to_string();
        manifest.source_map_dir = Some("dist".to_string());
        Self::new(manifest, None)
    }
}

/// Registry of available module types.
#[derive(Debug, Clone, Default)]
pub struct ModuleTypeRegistry {
    types: HashMap<String, ModuleType>,
}

impl ModuleTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ModuleType::kiwi());
        registry.register(ModuleType::web());
        registry
    }

    /// Register a type, replacing any type with the same id.
    pub fn register(&mut self, module_type: ModuleType) {
        self.types
            .insert(module_type.id().to_string(), module_type);
    }

    pub fn get(&self, id: &str) -> Option<&ModuleType> {
        self.types.get(id)
    }

    /// Type for `id`, or the built-in default of `technology`.
    pub fn resolve(&self, id: &str, technology: Technology) -> Option<&ModuleType> {
        self.types
            .get(id)
            .or_else(|| self.types.get(technology.default_module_type()))
    }

    pub fn list(&self) -> Vec<&ModuleType> {
        let mut types: Vec<_> = self.types.values().collect();
        types.sort_by(|a, b| a.id().cmp(b.id()));
        types
    }
}
