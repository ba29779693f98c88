//! Status command - Show one exchange.

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Args;
use forge_core::ExchangeStore;

use super::{print_exchange, Context};

#[derive(Args)]
pub struct StatusArgs {
    /// Exchange id
    exchange: String,

    /// Print the stored JSON document
    #[arg(long)]
    json: bool,
}

pub async fn execute(root: &Path, args: StatusArgs) -> Result<()> {
    let context = Context::open(root)?;
    let exchange = context
        .store
        .get_exchange(&args.exchange)
        .await
        .map_err(forge_engine::EngineError::from)
        .with_context(|| format!("Failed to load exchange {}", args.exchange))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&exchange)?);
    } else {
        print_exchange(&exchange);
    }
    Ok(())
}
