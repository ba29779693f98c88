//! Outcome of a test session.

use serde::{Deserialize, Serialize};

/// Evidence attached to a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub module: String,
    pub report: String,
    #[serde(skip)]
    pub screenshot: Vec<u8>,
    pub dom: String,
    pub console: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TestResult {
    Accepted { summary: String },
    Rejected(Rejection),
    Aborted { reason: String },
}

impl TestResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected(_) => "rejected",
            Self::Aborted { .. } => "aborted",
        }
    }
}
