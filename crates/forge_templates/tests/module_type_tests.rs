//! Integration tests for module-type loading.

use std::fs;

use forge_core::Technology;
use forge_templates::{render, ModuleTypeLoader, PromptArgs, PromptKind, TemplateError};
use tempfile::tempdir;

const REACT_MANIFEST: &str = r#"
id: react
name: React UI
technology: web
template_repo: https://example.com/templates/react.git
branch: stable
testable: true
commands:
  build:
    - npm run build
  deploy:
    - npm run deploy
source_globs:
  - "src/**/*.tsx"
prompts:
  fix: prompts/fix.txt
"#;

#[test]
fn test_load_type_from_disk() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("react");
    fs::create_dir_all(dir.join("prompts")).unwrap();
    fs::write(dir.join("module-type.yaml"), REACT_MANIFEST).unwrap();
    fs::write(dir.join("prompts/fix.txt"), "React build broke:\n{error}").unwrap();

    let registry = ModuleTypeLoader::new(temp.path()).load_all().unwrap();
    let react = registry.get("react").unwrap();

    assert_eq!(react.manifest.technology, Technology::Web);
    assert_eq!(react.manifest.branch, "stable");
    assert_eq!(react.manifest.commands.build, vec!["npm run build".to_string()]);
    assert!(react.is_testable());

    let prompt = render(
        react.prompt(PromptKind::Fix),
        &PromptArgs::new().with("error", "TS2304"),
    )
    .unwrap();
    assert_eq!(prompt, "React build broke:\nTS2304");

    // Built-ins are still there.
    assert!(registry.get("kiwi").is_some());
    assert!(registry.get("web").is_some());
}

#[test]
fn test_disk_type_replaces_builtin() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("web");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("module-type.yaml"),
        "id: web\nname: Custom web\ntechnology: web\n",
    )
    .unwrap();

    let registry = ModuleTypeLoader::new(temp.path()).load_all().unwrap();
    let web = registry.get("web").unwrap();
    assert_eq!(web.manifest.name, "Custom web");
    assert!(!web.is_testable());
}

#[test]
fn test_missing_prompt_file_is_an_error() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("react");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("module-type.yaml"), REACT_MANIFEST).unwrap();

    let loader = ModuleTypeLoader::new(temp.path());
    assert!(matches!(
        loader.load_type(&dir),
        Err(TemplateError::PromptNotFound(_))
    ));
    // A broken type is skipped, not fatal.
    assert!(loader.load_all().unwrap().get("react").is_none());
}
