//! Progress events pushed to listeners of a running exchange.

use serde::Serialize;

use crate::exchange::Exchange;

/// An event emitted while an exchange is processed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Snapshot after a persisted state transition.
    Exchange { exchange: Box<Exchange> },
    /// Streamed reasoning chunk from the model.
    Thought { module: String, chunk: String },
    /// Streamed content chunk from the model.
    Content { module: String, chunk: String },
    /// One executed test-loop step.
    TestStep {
        module: String,
        step: usize,
        action: String,
    },
}

impl ProgressEvent {
    pub fn exchange(exchange: &Exchange) -> Self {
        Self::Exchange {
            exchange: Box::new(exchange.clone()),
        }
    }
}
