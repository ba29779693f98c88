//! Exchange, Task and Attempt state model.
//!
//! An [`Exchange`] is one end-to-end generation request. It owns one
//! [`Task`] per module touched by the request, and every task owns the
//! [`Attempt`]s (model round-trip plus compile, or one test step) made for it.
//!
//! Status transitions only move forward:
//!
//! ```text
//! PLANNING ──▶ GENERATING ──▶ SUCCESSFUL ──▶ REVERTED
//!    │              │    └───▶ FAILED ─────▶ REVERTED
//!    └──────────────┴───────▶ CANCELLED
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Unique identifier for an exchange.
pub type ExchangeId = String;

/// Lifecycle status of an exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeStatus {
    Planning,
    Generating,
    Successful,
    Failed,
    Cancelled,
    Reverted,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Generating => "GENERATING",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Reverted => "REVERTED",
        }
    }

    /// Whether an exchange in this status is still being processed.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Planning | Self::Generating)
    }

    /// Whether the transition `self -> next` is allowed.
    pub fn can_transition_to(&self, next: ExchangeStatus) -> bool {
        use ExchangeStatus::*;
        matches!(
            (self, next),
            (Planning, Generating | Successful | Failed | Cancelled)
                | (Generating, Successful | Failed | Cancelled)
                | (Successful | Failed, Reverted)
        )
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a per-module task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Generating,
    Testing,
    Successful,
    Failed,
    Rejected,
}

/// Status of a single attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Running,
    Successful,
    Failed,
}

/// One model round-trip plus compile, or one test step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Attempt {
    fn running() -> Self {
        Self {
            status: AttemptStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != AttemptStatus::Running
    }

    /// Mark the attempt successful. Terminal attempts are never mutated.
    pub fn succeed(&mut self) -> CoreResult<()> {
        self.finish(AttemptStatus::Successful, None)
    }

    /// Mark the attempt failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> CoreResult<()> {
        self.finish(AttemptStatus::Failed, Some(error.into()))
    }

    fn finish(&mut self, status: AttemptStatus, error: Option<String>) -> CoreResult<()> {
        if self.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "attempt already finished with status {:?}",
                self.status
            )));
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// Work performed for one module within an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub module_id: String,
    pub module_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the module workspace was committed; revert undoes only these.
    #[serde(default)]
    pub committed: bool,
}

impl Task {
    pub fn new(module_id: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            module_name: module_name.into(),
            status: TaskStatus::Generating,
            attempts: Vec::new(),
            error: None,
            committed: false,
        }
    }

    /// Open a new running attempt.
    pub fn start_attempt(&mut self) -> &mut Attempt {
        self.attempts.push(Attempt::running());
        let last = self.attempts.len() - 1;
        &mut self.attempts[last]
    }

    /// The most recent attempt, if any.
    pub fn current_attempt_mut(&mut self) -> Option<&mut Attempt> {
        self.attempts.last_mut()
    }

    pub fn succeed_attempt(&mut self) -> CoreResult<()> {
        self.current_attempt_mut()
            .ok_or_else(|| CoreError::InvalidState("task has no attempt".to_string()))?
            .succeed()
    }

    pub fn fail_attempt(&mut self, error: impl Into<String>) -> CoreResult<()> {
        self.current_attempt_mut()
            .ok_or_else(|| CoreError::InvalidState("task has no attempt".to_string()))?
            .fail(error)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Mark the task failed. A still-running attempt is failed with it.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        if let Some(attempt) = self.attempts.last_mut() {
            if !attempt.is_terminal() {
                let _ = attempt.fail(error.clone());
            }
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error);
    }

    pub fn count_attempts(&self, status: AttemptStatus) -> usize {
        self.attempts.iter().filter(|a| a.status == status).count()
    }
}

/// One end-to-end generation request and its execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub application_id: String,
    pub requester_id: String,
    pub requirement: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub status: ExchangeStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// True when this exchange creates the application rather than updating it.
    pub first: bool,
}

impl Exchange {
    pub fn new(
        application_id: impl Into<String>,
        requester_id: impl Into<String>,
        requirement: impl Into<String>,
        first: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            application_id: application_id.into(),
            requester_id: requester_id.into(),
            requirement: requirement.into(),
            attachments: Vec::new(),
            status: ExchangeStatus::Planning,
            tasks: Vec::new(),
            product_url: None,
            management_url: None,
            source_url: None,
            error: None,
            created_at: now,
            heartbeat_at: now,
            finished_at: None,
            first,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Move to `next`, enforcing the forward-only lifecycle.
    ///
    /// Re-entering the current status is a no-op.
    pub fn transition(&mut self, next: ExchangeStatus) -> CoreResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if !next.is_running() {
            self.finished_at = Some(Utc::now());
        }
        self.heartbeat();
        Ok(())
    }

    /// Transition to FAILED and record the error message.
    pub fn fail(&mut self, message: impl Into<String>) -> CoreResult<()> {
        self.transition(ExchangeStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Advance the heartbeat. The timestamp is strictly increasing.
    pub fn heartbeat(&mut self) {
        self.touch(Utc::now());
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.heartbeat_at = if at > self.heartbeat_at {
            at
        } else {
            self.heartbeat_at + Duration::microseconds(1)
        };
    }

    /// Whether a running exchange has missed its heartbeat window.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_running() && now - self.heartbeat_at > timeout
    }

    /// Open a task for a module and return it.
    pub fn start_task(
        &mut self,
        module_id: impl Into<String>,
        module_name: impl Into<String>,
    ) -> &mut Task {
        self.tasks.push(Task::new(module_id, module_name));
        let last = self.tasks.len() - 1;
        &mut self.tasks[last]
    }

    pub fn current_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.last_mut()
    }

    pub fn task(&self, module_name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.module_name == module_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> Exchange {
        Exchange::new("app-1", "user-1", "class Foo{}", true)
    }

    #[test]
    fn test_forward_transitions() {
        let mut ex = exchange();
        assert_eq!(ex.status, ExchangeStatus::Planning);
        ex.transition(ExchangeStatus::Generating).unwrap();
        ex.transition(ExchangeStatus::Successful).unwrap();
        assert!(ex.finished_at.is_some());
        ex.transition(ExchangeStatus::Reverted).unwrap();
        assert!(ex.transition(ExchangeStatus::Generating).is_err());
    }

    #[test]
    fn test_cancel_only_while_running() {
        let mut ex = exchange();
        ex.transition(ExchangeStatus::Cancelled).unwrap();
        assert!(matches!(
            ex.transition(ExchangeStatus::Generating),
            Err(CoreError::InvalidTransition { .. })
        ));

        let mut done = exchange();
        done.transition(ExchangeStatus::Generating).unwrap();
        done.transition(ExchangeStatus::Successful).unwrap();
        assert!(done.transition(ExchangeStatus::Cancelled).is_err());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut ex = exchange();
        ex.transition(ExchangeStatus::Generating).unwrap();
        let err = ex.transition(ExchangeStatus::Planning).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid exchange transition: GENERATING -> PLANNING"
        );
    }

    #[test]
    fn test_heartbeat_strictly_advances() {
        let mut ex = exchange();
        let before = ex.heartbeat_at;
        ex.touch(before - Duration::seconds(10));
        assert!(ex.heartbeat_at > before);
    }

    #[test]
    fn test_attempt_is_immutable_once_terminal() {
        let mut task = Task::new("m1", "backend");
        task.start_attempt();
        task.fail_attempt("compile error").unwrap();
        assert!(task.succeed_attempt().is_err());
        assert_eq!(task.attempts[0].status, AttemptStatus::Failed);
        assert_eq!(task.attempts[0].error.as_deref(), Some("compile error"));
    }

    #[test]
    fn test_task_fail_closes_running_attempt() {
        let mut task = Task::new("m1", "backend");
        task.start_attempt();
        task.fail("gave up");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.count_attempts(AttemptStatus::Failed), 1);
    }

    #[test]
    fn test_stale_detection() {
        let mut ex = exchange();
        let now = ex.heartbeat_at + Duration::seconds(120);
        assert!(ex.is_stale(now, Duration::seconds(60)));
        assert!(!ex.is_stale(now, Duration::seconds(600)));
        ex.transition(ExchangeStatus::Failed).unwrap();
        assert!(!ex.is_stale(now, Duration::seconds(60)));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ExchangeStatus::Generating).unwrap();
        assert_eq!(json, "\"GENERATING\"");
    }
}
