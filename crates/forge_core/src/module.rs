//! Application and module definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Technology of a module: backend logic or UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    /// Backend-language module.
    Kiwi,
    /// Browser UI module.
    Web,
}

impl Technology {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "web" | "ui" | "frontend" => Self::Web,
            _ => Self::Kiwi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kiwi => "kiwi",
            Self::Web => "web",
        }
    }

    /// Name of the default module type for this technology.
    pub fn default_module_type(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One buildable unit of an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Module {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Workspace/project name, unique within the application.
    pub project_name: String,
    pub technology: Technology,
    /// Name of the module type (prompt templates, template repository, testability).
    pub module_type: String,
    /// Ids of the modules this module depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>, technology: Technology) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            project_name: slugify(&name),
            name,
            description: String::new(),
            technology,
            module_type: technology.default_module_type().to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = module_type.into();
        self
    }

    pub fn depends_on(mut self, module_id: impl Into<String>) -> Self {
        self.dependencies.push(module_id.into());
        self
    }
}

/// An application and its module graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub modules: Vec<Module>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_id: owner_id.into(),
            modules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Insert or replace a module (matched by id).
    pub fn upsert_module(&mut self, module: Module) {
        match self.modules.iter_mut().find(|m| m.id == module.id) {
            Some(existing) => *existing = module,
            None => self.modules.push(module),
        }
        self.updated_at = Utc::now();
    }

    /// Remove a module and every dependency edge pointing at it.
    pub fn remove_module(&mut self, id: &str) -> Option<Module> {
        let index = self.modules.iter().position(|m| m.id == id)?;
        let removed = self.modules.remove(index);
        for module in &mut self.modules {
            module.dependencies.retain(|d| d != id);
        }
        self.updated_at = Utc::now();
        Some(removed)
    }
}

/// Convert a name to a workspace-safe slug.
pub fn slugify(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Order Service"), "order-service");
        assert_eq!(slugify("  UI / Admin  "), "ui-admin");
    }

    #[test]
    fn test_remove_module_drops_edges() {
        let backend = Module::new("backend", Technology::Kiwi).with_id("b");
        let web = Module::new("web", Technology::Web).with_id("w").depends_on("b");
        let mut app = Application::new("shop", "u1")
            .with_module(backend)
            .with_module(web);

        let removed = app.remove_module("b").unwrap();
        assert_eq!(removed.name, "backend");
        assert!(app.module("w").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_technology_from_str() {
        assert_eq!(Technology::from_str("UI"), Technology::Web);
        assert_eq!(Technology::from_str("kiwi"), Technology::Kiwi);
        assert_eq!(Technology::from_str("anything"), Technology::Kiwi);
    }
}
