//! Browser test loop for generated UI modules.
//!
//! After a UI module builds and deploys, [`TestLoopDriver`] opens the
//! product in a [`Page`] and lets the model drive it: every step the model
//! sees the DOM, a screenshot, the console log and the history of earlier
//! steps, and answers with one [`Action`]. Commands of a step are executed
//! in order and the first failure is reported back on the next turn.

pub mod accounts;
pub mod action;
pub mod driver;
pub mod error;
pub mod executor;
pub mod mock;
pub mod page;
pub mod result;
pub mod sourcemap;

pub use accounts::AccountStore;
pub use action::{Action, Command, TestAccount};
pub use driver::{TestLoopDriver, TestSession, DEFAULT_MAX_STEPS};
pub use error::{BrowserError, BrowserResult};
pub use executor::{execute_command, execute_step, StepReport};
pub use mock::{ScriptedBrowser, ScriptedPage};
pub use page::{Browser, Page};
pub use result::{Rejection, TestResult};
pub use sourcemap::{OriginalPosition, SourceMap, SourceMaps};
