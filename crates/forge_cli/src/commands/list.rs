//! List command - List exchanges, newest first.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use forge_core::{ExchangeQuery, ExchangeStore};

use super::{first_line, Context};

#[derive(Args)]
pub struct ListArgs {
    /// Only exchanges of this application
    #[arg(short, long)]
    app: Option<String>,

    /// Only exchanges that are still running
    #[arg(long)]
    running: bool,

    /// Maximum number of exchanges
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
}

pub async fn execute(root: &Path, args: ListArgs) -> Result<()> {
    let context = Context::open(root)?;

    let mut query = ExchangeQuery::new().limit(args.limit);
    if let Some(app) = args.app {
        query = query.application(app);
    }
    if args.running {
        query = query.running();
    }

    let exchanges = context.store.search_exchanges(&query).await?;
    if exchanges.is_empty() {
        println!("No exchanges found");
        return Ok(());
    }

    println!("📋 {} exchange(s):", exchanges.len());
    for exchange in &exchanges {
        println!(
            "   {}  {:<10}  {}  {}",
            exchange.id,
            exchange.status.as_str(),
            exchange.created_at.format("%Y-%m-%d %H:%M"),
            first_line(&exchange.requirement)
        );
    }
    Ok(())
}
