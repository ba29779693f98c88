//! # forge_core
//!
//! Core state model for Forge.
//!
//! This crate holds everything the generation pipeline persists or shares:
//!
//! - **Exchange**: one generation request with its per-module tasks and attempts
//! - **Modules**: the application's module graph and its dependency resolver
//! - **Plan**: the ordered module-level tasks for one exchange
//! - **Stores**: save/get/search contracts with file and in-memory backends
//! - **Registry**: running exchanges, their cancellation tokens and progress channels
//!
//! # Example
//!
//! ```rust
//! use forge_core::{resolve_order, Module, Technology};
//!
//! let api = Module::new("api", Technology::Kiwi).with_id("api");
//! let web = Module::new("web", Technology::Web).with_id("web").depends_on("api");
//! let modules = vec![web, api];
//!
//! let order = resolve_order(&modules).unwrap();
//! assert_eq!(order[0].name, "api");
//! ```

pub mod error;
pub mod events;
pub mod exchange;
pub mod module;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod sweep;

pub use error::{CoreError, CoreResult};
pub use events::ProgressEvent;
pub use exchange::{Attempt, AttemptStatus, Exchange, ExchangeId, ExchangeStatus, Task, TaskStatus};
pub use module::{slugify, Application, Module, Technology};
pub use plan::{Plan, PlannedTask, TaskKind};
pub use registry::{ExchangeRegistry, ProgressSink, RunHandle};
pub use resolver::{resolve_order, resolve_order_lenient, DependencyNode};
pub use store::{ApplicationStore, ExchangeQuery, ExchangeStore, FileStore, MemoryStore};
pub use sweep::{expire_stale, ABANDONED_MESSAGE};
