//! The code agent: one chat session per module task.
//!
//! The first prompt asks for the module's code (create or update), later
//! prompts in the same session ask for fixes. Model faults are retried with
//! backoff; a reply that is not a valid patch is handed back to the caller
//! so the fix loop can echo the parse error to the model.

use std::fmt;
use std::sync::Arc;

use forge_chat::{Attachment, Chat, ChatError, ChatListener, Model};
use forge_core::{Module, Plan, ProgressEvent, ProgressSink};
use forge_patch::{parse_patch, Patch, PatchResult};
use forge_templates::{patch_rules, render, sanitize_code, ModuleType, PromptArgs, PromptKind};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use forge_chat::{execute_with_retry, RetryError, RetryPolicy};

/// Forwards streamed chunks to the exchange's progress channel.
struct ProgressForwarder {
    sink: ProgressSink,
    module: String,
}

impl ChatListener for ProgressForwarder {
    fn on_thought(&mut self, chunk: &str) {
        self.sink.emit(ProgressEvent::Thought {
            module: self.module.clone(),
            chunk: chunk.to_string(),
        });
    }

    fn on_content(&mut self, chunk: &str) {
        self.sink.emit(ProgressEvent::Content {
            module: self.module.clone(),
            chunk: chunk.to_string(),
        });
    }
}

/// A fault of one model round-trip.
#[derive(Debug)]
enum AgentFault {
    Chat(ChatError),
    /// The reply could not be used, e.g. a plan that is not JSON.
    Reply(String),
}

impl AgentFault {
    fn is_transient(&self) -> bool {
        match self {
            Self::Chat(e) => e.is_transient(),
            Self::Reply(_) => true,
        }
    }
}

impl fmt::Display for AgentFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(e) => write!(f, "{}", e),
            Self::Reply(msg) => write!(f, "unusable reply: {}", msg),
        }
    }
}

fn into_engine_error(subject: &str, err: RetryError<AgentFault>) -> EngineError {
    match err {
        RetryError::Cancelled
        | RetryError::Exhausted {
            error: AgentFault::Chat(ChatError::Cancelled),
            ..
        } => EngineError::Cancelled(String::new()),
        RetryError::Exhausted { tries, error } => EngineError::AgentFailed {
            module: subject.to_string(),
            attempts: tries,
            message: error.to_string(),
        },
    }
}

/// Send `prompt` on `chat`, retrying transient faults, and convert the
/// reply with `parse`.
#[allow(clippy::too_many_arguments)]
async fn ask_with<T>(
    chat: &Arc<Mutex<Box<dyn Chat>>>,
    subject: &str,
    prompt: &str,
    attachments: &[Attachment],
    retry: &RetryPolicy,
    sink: &ProgressSink,
    cancel: &CancellationToken,
    parse: impl Fn(&str) -> Result<T, String> + Sync,
) -> EngineResult<T> {
    let parse = &parse;
    execute_with_retry(retry, cancel, AgentFault::is_transient, || {
        let chat = Arc::clone(chat);
        let prompt = prompt.to_string();
        let attachments = attachments.to_vec();
        let cancel = cancel.clone();
        let mut listener = ProgressForwarder {
            sink: sink.clone(),
            module: subject.to_string(),
        };
        async move {
            let reply = chat
                .lock()
                .await
                .send(&prompt, &attachments, &mut listener, &cancel)
                .await
                .map_err(AgentFault::Chat)?;
            parse(&reply).map_err(AgentFault::Reply)
        }
    })
    .await
    .map_err(|e| into_engine_error(subject, e))
}

/// Inputs of a create or update prompt.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub requirement: String,
    /// Planner guidance for this module.
    pub suggestion: String,
    /// Current source in the patch format; empty for a new module.
    pub source: String,
    /// Source of the modules this one depends on.
    pub dependencies: String,
}

pub struct CodeAgent {
    module: Module,
    module_type: ModuleType,
    chat: Arc<Mutex<Box<dyn Chat>>>,
    retry: RetryPolicy,
}

impl CodeAgent {
    pub fn new(model: &dyn Model, module: Module, module_type: ModuleType, retry: RetryPolicy) -> Self {
        Self {
            module,
            module_type,
            chat: Arc::new(Mutex::new(model.create_chat(true))),
            retry,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    fn render_code_prompt(&self, kind: PromptKind, args: &PromptArgs) -> EngineResult<String> {
        let mut prompt = render(self.module_type.prompt(kind), args)?;
        if !prompt.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str(patch_rules());
        Ok(prompt)
    }

    /// The first prompt: update when the module already has source, else create.
    pub fn generation_prompt(&self, context: &GenerationContext) -> EngineResult<String> {
        let kind = if context.source.trim().is_empty() {
            PromptKind::Create
        } else {
            PromptKind::Update
        };
        let args = PromptArgs::new()
            .with("technology", self.module.technology.as_str())
            .with("module", self.module.name.as_str())
            .with("requirement", context.requirement.as_str())
            .with("suggestion", or_none(&context.suggestion))
            .with("source", context.source.as_str())
            .with("dependencies", or_none(&context.dependencies));
        self.render_code_prompt(kind, &args)
    }

    pub fn data_prompt(&self, context: &GenerationContext) -> EngineResult<String> {
        let args = PromptArgs::new()
            .with("module", self.module.name.as_str())
            .with("requirement", context.requirement.as_str())
            .with("suggestion", or_none(&context.suggestion))
            .with("source", or_none(&context.source));
        self.render_code_prompt(PromptKind::Data, &args)
    }

    pub fn fix_prompt(&self, error: &str, source: &str) -> EngineResult<String> {
        let args = PromptArgs::new()
            .with("error", error)
            .with("source", or_none(source));
        self.render_code_prompt(PromptKind::Fix, &args)
    }

    /// Send a prompt in this agent's session.
    pub async fn ask(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> EngineResult<String> {
        debug!("Prompting for module {} ({} chars)", self.module.name, prompt.len());
        ask_with(
            &self.chat,
            &self.module.name,
            prompt,
            attachments,
            &self.retry,
            sink,
            cancel,
            |reply| Ok(reply.to_string()),
        )
        .await
    }

    /// Parse a reply as a patch. Errors carry the offending position.
    pub fn parse_reply(reply: &str) -> PatchResult<Patch> {
        parse_patch(&sanitize_code(reply))
    }
}

/// Run a planning round in a fresh session.
///
/// A reply without a usable plan counts as a model fault and is retried.
pub async fn request_plan(
    model: &dyn Model,
    prompt: &str,
    attachments: &[Attachment],
    retry: &RetryPolicy,
    sink: &ProgressSink,
    cancel: &CancellationToken,
) -> EngineResult<Plan> {
    let chat = Arc::new(Mutex::new(model.create_chat(true)));
    ask_with(&chat, "plan", prompt, attachments, retry, sink, cancel, |reply| {
        Plan::from_reply(&sanitize_code(reply)).map_err(|e| e.to_string())
    })
    .await
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_chat::ScriptedModel;
    use forge_core::{TaskKind, Technology};

    fn agent(model: &ScriptedModel, retries: u32) -> CodeAgent {
        CodeAgent::new(
            model,
            Module::new("api", Technology::Kiwi),
            ModuleType::kiwi(),
            RetryPolicy::immediate(retries),
        )
    }

    #[test]
    fn test_create_or_update_prompt() {
        let model = ScriptedModel::new();
        let agent = agent(&model, 0);
        let mut context = GenerationContext {
            requirement: "a todo list".to_string(),
            ..Default::default()
        };
        let create = agent.generation_prompt(&context).unwrap();
        assert!(create.starts_with("Create the kiwi module \"api\""));
        assert!(create.ends_with(patch_rules()));

        context.source = "@@ Main.java @@\nclass Main {}\n".to_string();
        let update = agent.generation_prompt(&context).unwrap();
        assert!(update.starts_with("Update the kiwi module \"api\""));
        assert!(update.contains("class Main {}"));
    }

    #[test]
    fn test_parse_reply_reports_position() {
        let patch = CodeAgent::parse_reply("Here:\n```\n@@ A.java @@\nclass A {}\n```").unwrap();
        assert_eq!(patch.added.len(), 1);
        let err = CodeAgent::parse_reply("no patch here").unwrap_err();
        assert_eq!(err.position(), Some(1));
    }

    #[tokio::test]
    async fn test_ask_retries_transient_faults_in_one_session() {
        let model = ScriptedModel::new()
            .fail(ChatError::Stream("reset".to_string()))
            .reply("@@ A.java @@\nclass A {}\n");
        let agent = agent(&model, 2);
        let reply = agent
            .ask("go", &[], &ProgressSink::detached(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(reply.contains("class A"));
        assert_eq!(model.chats_created(), 1);
        assert_eq!(model.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_ask_gives_up_as_agent_failure() {
        let model = ScriptedModel::new()
            .fail(ChatError::EmptyResponse)
            .fail(ChatError::EmptyResponse);
        let agent = agent(&model, 1);
        let err = agent
            .ask("go", &[], &ProgressSink::detached(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_chat_is_cancellation() {
        let model = ScriptedModel::new().reply("a\nb\n").cancel_on_send(1);
        let agent = agent(&model, 3);
        let err = agent
            .ask("go", &[], &ProgressSink::detached(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_unparsable_plan_is_retried() {
        let model = ScriptedModel::new()
            .reply("I think you should build a shop.")
            .reply("```json\n{\"tasks\": [{\"module\": \"api\", \"type\": \"modify\"}]}\n```");
        let plan = request_plan(
            &model,
            "plan it",
            &[],
            &RetryPolicy::immediate(2),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(plan.tasks[0].kind, TaskKind::Modify);
        assert_eq!(model.prompts().len(), 2);
    }
}
