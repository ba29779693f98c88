//! # forge_templates
//!
//! Prompt templates and module types for Forge.
//!
//! - [`render`] substitutes positional `{}` and named `{key}` placeholders
//! - [`sanitize_code`] strips prose and code fences from model replies
//! - [`ModuleTypeLoader`] loads data-driven module types on top of the
//!   built-in `kiwi` (backend) and `web` (UI) types
//!
//! ## Example
//!
//! ```rust
//! use forge_templates::{render, sanitize_code, PromptArgs};
//!
//! let prompt = render("Fix {module}: {}", &PromptArgs::new().arg("missing ;").with("module", "api")).unwrap();
//! assert_eq!(prompt, "Fix api: missing ;");
//!
//! assert_eq!(sanitize_code("Here you go:\n```\nclass Foo{}\n```"), "class Foo{}\n");
//! ```

pub mod error;
pub mod loader;
pub mod manifest;
pub mod prompts;
pub mod renderer;
pub mod sanitize;

pub use error::{TemplateError, TemplateResult};
pub use loader::ModuleTypeLoader;
pub use manifest::{CommandSpec, ModuleType, ModuleTypeManifest, ModuleTypeRegistry};
pub use prompts::{patch_rules, PromptKind};
pub use renderer::{render, PromptArgs};
pub use sanitize::sanitize_code;
