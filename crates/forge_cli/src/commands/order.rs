//! Order command - Print the generation order of an application's modules.

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Args;
use forge_core::{resolve_order, Application, ApplicationStore};

use super::Context;

#[derive(Args)]
pub struct OrderArgs {
    /// Application id
    app: String,
}

pub async fn execute(root: &Path, args: OrderArgs) -> Result<()> {
    let context = Context::open(root)?;
    let app = context
        .store
        .get_application(&args.app)
        .await
        .map_err(forge_engine::EngineError::from)
        .with_context(|| format!("Failed to load application {}", args.app))?;

    println!("🔗 Generation order of {}:", app.name);
    for line in order_lines(&app)? {
        println!("   {}", line);
    }
    Ok(())
}

/// Modules in dependency order, each with the names it depends on.
fn order_lines(app: &Application) -> Result<Vec<String>> {
    let ordered = resolve_order(&app.modules).map_err(forge_engine::EngineError::from)?;
    Ok(ordered
        .iter()
        .enumerate()
        .map(|(index, module)| {
            let dependencies: Vec<&str> = module
                .dependencies
                .iter()
                .filter_map(|id| app.module(id).map(|m| m.name.as_str()))
                .collect();
            if dependencies.is_empty() {
                format!("{}. {} ({})", index + 1, module.name, module.technology)
            } else {
                format!(
                    "{}. {} ({}) after {}",
                    index + 1,
                    module.name,
                    module.technology,
                    dependencies.join(", ")
                )
            }
        })
        .collect())
}
