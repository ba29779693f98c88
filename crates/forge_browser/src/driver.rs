//! The model-directed test loop.
//!
//! Each step captures the page, asks the model for one action and executes
//! it. The loop ends when the model accepts, rejects or aborts, or when the
//! step budget runs out.

use std::sync::Arc;

use forge_chat::{
    execute_with_retry, Attachment, ChatError, ChatListener, Model, RetryError, RetryPolicy,
};
use forge_core::{ProgressEvent, ProgressSink};
use forge_templates::{render, PromptArgs, PromptKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accounts::AccountStore;
use crate::action::{Action, TestAccount};
use crate::error::{BrowserError, BrowserResult};
use crate::executor::execute_step;
use crate::page::Page;
use crate::result::{Rejection, TestResult};
use crate::sourcemap::SourceMaps;

pub const DEFAULT_MAX_STEPS: usize = 100;
const DEFAULT_MAX_DOM_CHARS: usize = 30_000;

/// What is being tested.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub application_id: String,
    pub module: String,
    pub requirement: String,
    /// Module source, rendered in the patch format.
    pub source: String,
}

struct ThoughtForwarder<'a> {
    sink: &'a ProgressSink,
    module: &'a str,
}

impl ChatListener for ThoughtForwarder<'_> {
    fn on_thought(&mut self, chunk: &str) {
        self.sink.emit(ProgressEvent::Thought {
            module: self.module.to_string(),
            chunk: chunk.to_string(),
        });
    }
}

fn render_accounts(accounts: &[TestAccount]) -> String {
    if accounts.is_empty() {
        return "(none)".to_string();
    }
    accounts
        .iter()
        .map(|a| format!("- username: {} password: {}", a.username, a.password))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text,
    }
}

pub struct TestLoopDriver {
    model: Arc<dyn Model>,
    accounts: AccountStore,
    template: String,
    max_steps: usize,
    max_dom_chars: usize,
    source_maps: SourceMaps,
    retry: RetryPolicy,
}

impl TestLoopDriver {
    pub fn new(model: Arc<dyn Model>, accounts: AccountStore) -> Self {
        Self {
            model,
            accounts,
            template: PromptKind::Test.default_text().to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_dom_chars: DEFAULT_MAX_DOM_CHARS,
            source_maps: SourceMaps::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_source_maps(mut self, source_maps: SourceMaps) -> Self {
        self.source_maps = source_maps;
        self
    }

    /// Backoff for transient model faults of one step.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ask the model for the next action on a fresh chat per try.
    async fn ask(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        module: &str,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> BrowserResult<String> {
        let model = self.model.as_ref();
        execute_with_retry(&self.retry, cancel, ChatError::is_transient, move || async move {
            let mut chat = model.create_chat(false);
            let mut listener = ThoughtForwarder { sink, module };
            chat.send(prompt, attachments, &mut listener, cancel).await
        })
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => BrowserError::Cancelled,
            RetryError::Exhausted { error, .. } => error.into(),
        })
    }

    /// Drive `page` until the model reaches a verdict.
    pub async fn run(
        &self,
        page: &dyn Page,
        session: &TestSession,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> BrowserResult<TestResult> {
        info!("Testing module {}", session.module);
        let mut history: Vec<String> = Vec::new();
        let mut last_error = "none".to_string();

        for step in 1..=self.max_steps {
            if cancel.is_cancelled() {
                return Err(BrowserError::Cancelled);
            }

            let target = page.target_id().await?;
            let console = self.source_maps.deobfuscate(&page.console_logs().await?);
            let dom = truncate(page.dom().await?, self.max_dom_chars);
            let screenshot = page.screenshot().await?;

            let args = PromptArgs::new()
                .with("module", session.module.as_str())
                .with("requirement", session.requirement.as_str())
                .with("source", session.source.as_str())
                .with("accounts", render_accounts(&self.accounts.load(&session.application_id)))
                .with("target", target)
                .with("console", console.as_str())
                .with("dom", dom.as_str())
                .with(
                    "history",
                    if history.is_empty() {
                        "(none)".to_string()
                    } else {
                        history.join("\n")
                    },
                )
                .with("last_error", last_error.as_str());
            let prompt = render(&self.template, &args)?;

            let attachments = [Attachment::png(format!("step-{}.png", step), screenshot.clone())];
            let reply = self
                .ask(&prompt, &attachments, &session.module, sink, cancel)
                .await?;

            let action = match Action::parse(&reply) {
                Ok(action) => action,
                Err(e) => {
                    warn!("Step {} of {}: {}", step, session.module, e);
                    history.push(format!("{}. (unparsable reply) -> {}", step, e));
                    last_error = e.to_string();
                    continue;
                }
            };

            sink.emit(ProgressEvent::TestStep {
                module: session.module.clone(),
                step,
                action: action.kind().to_string(),
            });
            debug!("Step {} of {}: {}", step, session.module, action.kind());

            match action {
                Action::Step { commands, accounts } => {
                    if !accounts.is_empty() {
                        self.accounts.merge(&session.application_id, &accounts)?;
                    }
                    let report = execute_step(page, &commands).await?;
                    let rendered = Action::Step { commands, accounts }.render();
                    let outcome = report.error.clone().unwrap_or_else(|| "ok".to_string());
                    history.push(format!("{}. {} -> {}", step, rendered.replace('\n', " "), outcome));
                    last_error = report.error.unwrap_or_else(|| "none".to_string());
                }
                Action::Accept { summary } => {
                    info!("Module {} accepted after {} steps", session.module, step);
                    return Ok(TestResult::Accepted { summary });
                }
                Action::Reject { report } => {
                    info!("Module {} rejected: {}", session.module, report);
                    return Ok(TestResult::Rejected(Rejection {
                        module: session.module.clone(),
                        report,
                        screenshot,
                        dom,
                        console,
                    }));
                }
                Action::Abort { reason } => {
                    warn!("Testing of {} aborted: {}", session.module, reason);
                    return Ok(TestResult::Aborted { reason });
                }
            }
        }

        Ok(TestResult::Aborted {
            reason: format!("step budget of {} exhausted", self.max_steps),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo".to_string(), 10), "héllo");
        assert_eq!(truncate("héllo".to_string(), 2), "hé\n... (truncated)");
    }

    #[test]
    fn test_render_accounts() {
        assert_eq!(render_accounts(&[]), "(none)");
        let accounts = [TestAccount {
            username: "ada".to_string(),
            password: "pw".to_string(),
        }];
        assert_eq!(render_accounts(&accounts), "- username: ada password: pw");
    }
}
