//! Module-type loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::{ModuleType, ModuleTypeManifest, ModuleTypeRegistry};

const MANIFEST_FILES: [&str; 2] = ["module-type.yaml", "module-type.yml"];

/// Loads module types from `<dir>/<name>/module-type.yaml`.
pub struct ModuleTypeLoader {
    types_path: PathBuf,
}

impl ModuleTypeLoader {
    pub fn new(types_path: impl Into<PathBuf>) -> Self {
        Self {
            types_path: types_path.into(),
        }
    }

    /// Load the built-in types, then every type found on disk.
    ///
    /// A type on disk replaces a built-in with the same id. Directories that
    /// fail to load are skipped with a warning.
    pub fn load_all(&self) -> TemplateResult<ModuleTypeRegistry> {
        let mut registry = ModuleTypeRegistry::builtin();

        if !self.types_path.exists() {
            debug!(
                "Module types directory does not exist: {:?}, using built-ins",
                self.types_path
            );
            return Ok(registry);
        }

        for entry in WalkDir::new(&self.types_path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match self.load_type(path) {
                Ok(module_type) => {
                    info!(
                        "Loaded module type: {} ({})",
                        module_type.manifest.name,
                        module_type.id()
                    );
                    registry.register(module_type);
                }
                Err(e) => warn!("Failed to load module type from {:?}: {}", path, e),
            }
        }

        Ok(registry)
    }

    /// Load a single module type directory.
    pub fn load_type(&self, path: &Path) -> TemplateResult<ModuleType> {
        let manifest_path = MANIFEST_FILES
            .iter()
            .map(|f| path.join(f))
            .find(|p| p.exists())
            .ok_or_else(|| {
                TemplateError::NotFound(format!("No module-type.yaml found in {:?}", path))
            })?;

        debug!("Loading manifest from {:?}", manifest_path);
        let content = fs::read_to_string(&manifest_path)?;
        let manifest: ModuleTypeManifest = serde_yaml::from_str(&content)?;

        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(TemplateError::InvalidManifest {
                module_type: manifest.id.clone(),
                message: issues.join("; "),
            });
        }

        let overrides: Vec<_> = manifest
            .prompts
            .iter()
            .map(|(kind, file)| (*kind, path.join(file)))
            .collect();

        let mut module_type = ModuleType::new(manifest, Some(path.to_path_buf()));
        for (kind, file) in overrides {
            if !file.exists() {
                return Err(TemplateError::PromptNotFound(file));
            }
            let text = fs::read_to_string(&file)?;
            module_type = module_type.with_prompt(kind, text);
        }
        Ok(module_type)
    }
}
