//! forge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Generation failed
//! - 4: Cancelled

use std::process::ExitCode;

use clap::Parser;
use forge_core::CoreError;
use forge_engine::EngineError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const GENERATION_FAILED: u8 = 3;
    pub const CANCELLED: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "forge=debug"
    } else if cli.quiet {
        "forge=warn"
    } else {
        "forge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Ignore a subscriber installed by an embedding process.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::execute(&cli.workspace, args).await,
        Commands::Status(args) => commands::status::execute(&cli.workspace, args).await,
        Commands::List(args) => commands::list::execute(&cli.workspace, args).await,
        Commands::Revert(args) => commands::revert::execute(&cli.workspace, args).await,
        Commands::Sweep(args) => commands::sweep::execute(&cli.workspace, args).await,
        Commands::Order(args) => commands::order::execute(&cli.workspace, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map the first engine error in the chain to an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let engine = e.chain().find_map(|cause| cause.downcast_ref::<EngineError>());
    match engine {
        Some(EngineError::GenerationFailed { .. } | EngineError::AgentFailed { .. }) => {
            ExitCodes::GENERATION_FAILED
        }
        Some(EngineError::Cancelled(_)) => ExitCodes::CANCELLED,
        Some(EngineError::Config(_))
        | Some(EngineError::Core(
            CoreError::ExchangeNotFound(_) | CoreError::ApplicationNotFound(_),
        )) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_error() {
        let failed: anyhow::Result<()> = Err(EngineError::GenerationFailed {
            module: "api".to_string(),
            attempts: 5,
            last_error: "error: build failed".to_string(),
        }
        .into());
        let failed = failed.context("Generation failed").unwrap_err();
        assert_eq!(categorize_error(&failed), ExitCodes::GENERATION_FAILED);

        let cancelled = anyhow::Error::from(EngineError::Cancelled("ex-1".to_string()));
        assert_eq!(categorize_error(&cancelled), ExitCodes::CANCELLED);

        let missing = anyhow::Error::from(EngineError::Core(CoreError::ExchangeNotFound(
            "nope".to_string(),
        )));
        assert_eq!(categorize_error(&missing), ExitCodes::INVALID_ARGS);

        assert_eq!(
            categorize_error(&anyhow::anyhow!("disk full")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
