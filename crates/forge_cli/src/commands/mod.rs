//! CLI command definitions.
//!
//! Each subcommand maps to one operation of the generation service or its
//! stores. Commands share a [`Context`] opened on the workspace root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use forge_chat::HttpModel;
use forge_compiler::{LocalWorkspaces, WorkspaceSettings};
use forge_core::{Exchange, FileStore};
use forge_engine::{EngineConfig, GenerationService};
use forge_templates::ModuleTypeLoader;
use tracing::debug;

pub mod generate;
pub mod list;
pub mod order;
pub mod revert;
pub mod status;
pub mod sweep;

/// forge - generate applications from natural-language requirements
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "forge - generate applications from natural-language requirements")]
#[command(long_about = r#"
forge turns a requirement into a set of generated, built and deployed modules.
Every request is an exchange: planned, generated module by module, fixed until
it builds, tested in a browser where configured, and committed.

COMMANDS:
  generate  → Run an exchange for a requirement
  status    → Show an exchange with its tasks and attempts
  list      → List exchanges, newest first
  revert    → Undo the commits of a finished exchange
  sweep     → Fail running exchanges whose heartbeat expired
  order     → Print the generation order of an application's modules

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Generation failed
  4 - Cancelled
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace root holding forge.toml, module types and state
    #[arg(short, long, global = true, env = "FORGE_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an exchange for a requirement
    Generate(generate::GenerateArgs),

    /// Show an exchange
    Status(status::StatusArgs),

    /// List exchanges
    List(list::ListArgs),

    /// Revert a finished exchange
    Revert(revert::RevertArgs),

    /// Expire abandoned exchanges
    Sweep(sweep::SweepArgs),

    /// Print the module generation order of an application
    Order(order::OrderArgs),
}

/// Configuration and stores of one workspace root.
pub struct Context {
    pub root: PathBuf,
    pub config: EngineConfig,
    pub store: Arc<FileStore>,
}

impl Context {
    pub fn open(root: &Path) -> Result<Self> {
        let config = EngineConfig::load(root)
            .with_context(|| format!("Failed to load configuration from {:?}", root))?;
        debug!("Workspace root {:?}, mode {:?}", root, config.mode);
        Ok(Self {
            root: root.to_path_buf(),
            store: Arc::new(FileStore::new(root)),
            config,
        })
    }

    /// Build the generation service against the configured model.
    pub fn service(&self) -> Result<GenerationService> {
        let model = HttpModel::from_env().context("No model configured")?;
        debug!("Using model {}", model.model());

        let module_types = ModuleTypeLoader::new(self.root.join("module-types"))
            .load_all()
            .context("Failed to load module types")?;

        let mut settings = WorkspaceSettings::new(self.root.join("workspaces"));
        settings.product_base_url = self.config.product_base_url.clone();
        settings.management_base_url = self.config.management_base_url.clone();
        settings.source_base_url = self.config.source_base_url.clone();

        Ok(GenerationService::new(
            self.config.clone(),
            Arc::new(model),
            self.store.clone(),
            self.store.clone(),
            Arc::new(LocalWorkspaces::new(settings)),
        )
        .with_module_types(module_types))
    }
}

/// Print an exchange with its tasks and attempts.
pub fn print_exchange(exchange: &Exchange) {
    println!("📦 Exchange {} [{}]", exchange.id, exchange.status);
    println!("   Application: {}", exchange.application_id);
    println!("   Requirement: {}", first_line(&exchange.requirement));
    println!("   Created:     {}", exchange.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = exchange.finished_at {
        println!("   Finished:    {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }

    for task in &exchange.tasks {
        println!("   • {} [{:?}]", task.module_name, task.status);
        for (index, attempt) in task.attempts.iter().enumerate() {
            match &attempt.error {
                Some(error) => println!(
                    "      {}. {:?}: {}",
                    index + 1,
                    attempt.status,
                    first_line(error)
                ),
                None => println!("      {}. {:?}", index + 1, attempt.status),
            }
        }
        if let Some(error) = &task.error {
            println!("      ⚠️  {}", first_line(error));
        }
    }

    for (label, url) in [
        ("Product", &exchange.product_url),
        ("Management", &exchange.management_url),
        ("Source", &exchange.source_url),
    ] {
        if let Some(url) = url {
            println!("   {} URL: {}", label, url);
        }
    }
    if let Some(error) = &exchange.error {
        println!("   ❌ {}", error);
    }
}

pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
