//! # forge_engine
//!
//! The generation pipeline: plan, generate, build, fix, test, deploy, commit.
//!
//! [`GenerationService`] owns the state machine of every exchange. Build and
//! test failures of generated code drive a bounded fix loop in the module's
//! chat session; model and transport faults are retried with capped
//! exponential backoff; cancellation is checked before every persisted
//! change and between streamed chunks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use forge_chat::HttpModel;
//! use forge_compiler::{LocalWorkspaces, WorkspaceSettings};
//! use forge_core::FileStore;
//! use forge_engine::{EngineConfig, GenerationRequest, GenerationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = std::path::Path::new(".");
//! let store = Arc::new(FileStore::new(root));
//! let service = GenerationService::new(
//!     EngineConfig::load(root)?,
//!     Arc::new(HttpModel::from_env()?),
//!     store.clone(),
//!     store,
//!     Arc::new(LocalWorkspaces::new(WorkspaceSettings::new(root.join("workspaces")))),
//! );
//!
//! let outcome = service
//!     .run(GenerationRequest::new("A todo list with tags", "me"))
//!     .await?;
//! println!("{} {:?}", outcome.exchange.status, outcome.exchange.product_url);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod data;
pub mod error;
pub mod orchestrator;

pub use forge_chat::{execute_with_retry, RetryError, RetryPolicy};
pub use agent::{request_plan, CodeAgent, GenerationContext};
pub use config::{EngineConfig, PipelineMode, RetrySettings, CONFIG_FILE};
pub use data::{DataAgent, WorkspaceDataAgent};
pub use error::{EngineError, EngineResult};
pub use orchestrator::{
    Dispatch, GenerationOutcome, GenerationRequest, GenerationService, Submission,
};
