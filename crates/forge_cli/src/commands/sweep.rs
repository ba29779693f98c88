//! Sweep command - Fail running exchanges whose heartbeat expired.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use forge_core::expire_stale;

use super::Context;

#[derive(Args)]
pub struct SweepArgs {
    /// Heartbeat timeout in seconds, overriding the configuration
    #[arg(long)]
    timeout: Option<u64>,
}

pub async fn execute(root: &Path, args: SweepArgs) -> Result<()> {
    let context = Context::open(root)?;
    let timeout = match args.timeout {
        Some(secs) => chrono::Duration::seconds(i64::try_from(secs)?),
        None => context.config.heartbeat_timeout(),
    };

    let expired = expire_stale(context.store.as_ref(), timeout, Utc::now()).await?;
    if expired.is_empty() {
        println!("✅ No abandoned exchanges");
    } else {
        println!("🧹 Expired {} exchange(s):", expired.len());
        for id in &expired {
            println!("   - {}", id);
        }
    }
    Ok(())
}
