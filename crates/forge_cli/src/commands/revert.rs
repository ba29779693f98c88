//! Revert command - Undo the commits of a finished exchange.

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use super::Context;

#[derive(Args)]
pub struct RevertArgs {
    /// Exchange id
    exchange: String,
}

pub async fn execute(root: &Path, args: RevertArgs) -> Result<()> {
    info!("Reverting exchange {}", args.exchange);
    let context = Context::open(root)?;
    let service = context.service()?;

    let exchange = service
        .revert(&args.exchange)
        .await
        .with_context(|| format!("Failed to revert exchange {}", args.exchange))?;

    let reverted = exchange.tasks.iter().filter(|t| t.committed).count();
    println!("↩️  Exchange {} reverted ({} module(s))", exchange.id, reverted);
    Ok(())
}
