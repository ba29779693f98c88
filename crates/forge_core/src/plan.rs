//! Generation plans.
//!
//! A plan is produced once per exchange, either by a planning round with the
//! model or synthesized as "modify every known module".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::module::{Application, Technology};
use crate::resolver::{resolve_order_lenient, DependencyNode};

/// Kind of work planned for a module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Create,
    Modify,
    Delete,
    #[serde(alias = "data_manipulation", alias = "data-manipulate")]
    Data,
    Test,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Data => "data",
            Self::Test => "test",
        }
    }
}

/// A module-level task in a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedTask {
    /// Module name (existing or to be created).
    pub module: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub suggestion: String,
    /// Names of modules this task depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<Technology>,
}

impl PlannedTask {
    pub fn new(module: impl Into<String>, kind: TaskKind, suggestion: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            kind,
            suggestion: suggestion.into(),
            dependencies: Vec::new(),
            technology: None,
        }
    }

    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        self.dependencies.push(module.into());
        self
    }

    pub fn with_technology(mut self, technology: Technology) -> Self {
        self.technology = Some(technology);
        self
    }
}

impl DependencyNode for PlannedTask {
    fn key(&self) -> &str {
        &self.module
    }

    fn display_name(&self) -> &str {
        &self.module
    }

    fn dependency_keys(&self) -> &[String] {
        &self.dependencies
    }
}

/// Ordered list of module tasks for one exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    /// Application name proposed by the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
}

impl Plan {
    pub fn new(tasks: Vec<PlannedTask>) -> Self {
        Self { name: None, tasks }
    }

    /// Plan that modifies every module of the application with the same requirement.
    pub fn modify_all(app: &Application, requirement: &str) -> Self {
        let names: HashMap<&str, &str> = app
            .modules
            .iter()
            .map(|m| (m.id.as_str(), m.name.as_str()))
            .collect();

        let tasks = app
            .modules
            .iter()
            .map(|m| PlannedTask {
                module: m.name.clone(),
                kind: TaskKind::Modify,
                suggestion: requirement.to_string(),
                dependencies: m
                    .dependencies
                    .iter()
                    .filter_map(|d| names.get(d.as_str()).map(|n| n.to_string()))
                    .collect(),
                technology: Some(m.technology),
            })
            .collect();

        Self {
            name: Some(app.name.clone()),
            tasks,
        }
    }

    /// Tasks in dependency order.
    pub fn ordered(&self) -> CoreResult<Vec<&PlannedTask>> {
        resolve_order_lenient(&self.tasks)
    }

    /// Parse a plan from a model reply, taking the outermost JSON object.
    pub fn from_reply(reply: &str) -> CoreResult<Self> {
        let start = reply
            .find('{')
            .ok_or_else(|| CoreError::Serialization("plan reply contains no JSON object".to_string()))?;
        let end = reply
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| CoreError::Serialization("plan reply has an unterminated JSON object".to_string()))?;
        let plan: Plan = serde_json::from_str(&reply[start..=end])?;
        if plan.tasks.is_empty() {
            return Err(CoreError::Serialization("plan contains no tasks".to_string()));
        }
        Ok(plan)
    }
}
