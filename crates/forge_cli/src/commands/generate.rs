//! Generate command - Run an exchange for a requirement.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use forge_chat::Attachment;
use forge_core::ProgressEvent;
use forge_engine::GenerationRequest;
use tracing::{info, warn};

use super::{print_exchange, Context};

#[derive(Args)]
pub struct GenerateArgs {
    /// Requirement text, or `-` to read it from stdin
    requirement: String,

    /// Existing application to change; a new one is created otherwise
    #[arg(short, long)]
    app: Option<String>,

    /// Name of a new application
    #[arg(short, long)]
    name: Option<String>,

    /// Requester recorded on the exchange
    #[arg(long, env = "FORGE_REQUESTER", default_value = "local")]
    requester: String,

    /// Attach a file (image or document) to the requirement
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,

    /// Stream model output to stdout
    #[arg(long)]
    stream: bool,
}

pub async fn execute(root: &Path, args: GenerateArgs) -> Result<()> {
    let context = Context::open(root)?;
    let service = Arc::new(context.service()?);

    let requirement = if args.requirement == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read the requirement from stdin")?;
        text
    } else {
        args.requirement
    };
    if requirement.trim().is_empty() {
        anyhow::bail!("The requirement is empty");
    }

    let attachments = args
        .attachments
        .iter()
        .map(|path| {
            Attachment::from_path(path).with_context(|| format!("Failed to read attachment {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut request = GenerationRequest::new(requirement, args.requester).with_attachments(attachments);
    if let Some(app) = args.app {
        request = request.for_application(app);
    }
    if let Some(name) = args.name {
        request = request.with_name(name);
    }

    let (exchange_id, handle) = service.start(request).await?;
    println!("🚀 Exchange {} started", exchange_id);
    let mut events = service
        .attach(&exchange_id)
        .context("Exchange finished before it could be followed")?;

    let stream = args.stream;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Exchange { exchange } => {
                    if let Some(task) = exchange.tasks.last() {
                        info!(
                            "Exchange {}: {} ({} {:?})",
                            exchange.id, exchange.status, task.module_name, task.status
                        );
                    }
                }
                ProgressEvent::Content { chunk, .. } if stream => {
                    print!("{}", chunk);
                    let _ = std::io::stdout().flush();
                }
                ProgressEvent::TestStep { module, step, action } => {
                    println!("   🧪 {} step {}: {}", module, step, action);
                }
                _ => {}
            }
        }
    });

    let cancel_service = Arc::clone(&service);
    let cancel_id = exchange_id.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling exchange {}", cancel_id);
            cancel_service.cancel(&cancel_id);
        }
    });

    let outcome = handle.await.context("Generation task panicked")??;
    interrupt.abort();
    // The channel closes once the run handle is released.
    let _ = printer.await;

    println!();
    print_exchange(&outcome.exchange);
    outcome.into_result()?;
    println!("✅ Exchange {} completed", exchange_id);
    Ok(())
}
