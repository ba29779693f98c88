//! The generation orchestrator.
//!
//! One [`GenerationService`] drives every exchange through
//! `PLANNING -> GENERATING -> SUCCESSFUL | FAILED | CANCELLED`. Modules are
//! processed strictly in dependency order. Every state change is persisted
//! and pushed to the exchange's progress channel; every persisted change
//! while running is preceded by a cancellation checkpoint.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use forge_browser::{
    AccountStore, Browser, SourceMaps, TestLoopDriver, TestResult, TestSession,
};
use forge_chat::{Attachment, Model};
use forge_compiler::{Compiler, Deployment, WorkspaceProvider};
use forge_core::{
    expire_stale, resolve_order, Application, ApplicationStore, CoreError, Exchange, ExchangeId,
    ExchangeQuery, ExchangeRegistry, ExchangeStatus, ExchangeStore, Module, Plan, PlannedTask,
    ProgressEvent, RunHandle, Task, TaskKind, TaskStatus, Technology,
};
use forge_patch::render_files;
use forge_templates::{render, ModuleType, ModuleTypeRegistry, PromptArgs, PromptKind};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::agent::{request_plan, CodeAgent, GenerationContext};
use crate::config::{EngineConfig, PipelineMode};
use crate::data::{DataAgent, WorkspaceDataAgent};
use crate::error::{EngineError, EngineResult};

/// A request to generate or change an application.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub requirement: String,
    pub requester_id: String,
    /// Existing application to change; a new one is created when absent.
    pub application_id: Option<String>,
    /// Name of a new application.
    pub application_name: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl GenerationRequest {
    pub fn new(requirement: impl Into<String>, requester_id: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            requester_id: requester_id.into(),
            application_id: None,
            application_name: None,
            attachments: Vec::new(),
        }
    }

    pub fn for_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Final state of a processed exchange.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub exchange: Exchange,
    /// Why the exchange did not succeed.
    pub fault: Option<EngineError>,
}

impl GenerationOutcome {
    pub fn is_successful(&self) -> bool {
        self.exchange.status == ExchangeStatus::Successful
    }

    pub fn into_result(self) -> EngineResult<Exchange> {
        match self.fault {
            Some(fault) => Err(fault),
            None => Ok(self.exchange),
        }
    }
}

/// Where an exchange is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On the caller's task; `submit` returns when the exchange is done.
    #[default]
    Inline,
    /// On a spawned task; `submit` returns once the exchange is registered.
    Background,
}

pub enum Submission {
    Finished(GenerationOutcome),
    Started {
        exchange_id: ExchangeId,
        handle: JoinHandle<EngineResult<GenerationOutcome>>,
    },
}

impl Submission {
    pub fn exchange_id(&self) -> &str {
        match self {
            Self::Finished(outcome) => &outcome.exchange.id,
            Self::Started { exchange_id, .. } => exchange_id,
        }
    }
}

struct BrowserTesting {
    browser: Arc<dyn Browser>,
    accounts: AccountStore,
}

/// State owned by the task processing one exchange.
struct Run {
    exchange: Exchange,
    app: Application,
    request: GenerationRequest,
    handle: RunHandle,
}

/// One planned task resolved against the application.
struct ModuleJob {
    planned: PlannedTask,
    module: Module,
    module_type: ModuleType,
    compiler: Arc<dyn Compiler>,
}

#[derive(Debug, Clone, Copy)]
enum Apply {
    Build,
    Data,
}

fn task_mut(exchange: &mut Exchange) -> EngineResult<&mut Task> {
    exchange
        .current_task_mut()
        .ok_or_else(|| EngineError::Core(CoreError::InvalidState("exchange has no task".to_string())))
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

fn default_app_name(requirement: &str) -> String {
    let line = first_line(requirement);
    if line.is_empty() {
        return "application".to_string();
    }
    line.chars().take(40).collect::<String>().trim().to_string()
}

fn describe_modules(app: &Application) -> String {
    if app.modules.is_empty() {
        return "(none)".to_string();
    }
    app.modules
        .iter()
        .map(|m| {
            let deps: Vec<&str> = m
                .dependencies
                .iter()
                .filter_map(|d| app.module(d).map(|dep| dep.name.as_str()))
                .collect();
            let mut line = format!("- {} ({})", m.name, m.technology);
            if !m.description.is_empty() {
                line.push_str(": ");
                line.push_str(&m.description);
            }
            if !deps.is_empty() {
                line.push_str(&format!(" [depends on: {}]", deps.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Add modules the plan introduces and the dependency edges it declares.
fn apply_plan(app: &mut Application, tasks: &[PlannedTask]) {
    for planned in tasks {
        if planned.kind == TaskKind::Delete || app.module_by_name(&planned.module).is_some() {
            continue;
        }
        let technology = planned.technology.unwrap_or(Technology::Kiwi);
        info!("Adding module {} ({}) to {}", planned.module, technology, app.name);
        app.upsert_module(
            Module::new(planned.module.as_str(), technology)
                .with_description(planned.suggestion.as_str()),
        );
    }

    for planned in tasks {
        let Some(mut module) = app.module_by_name(&planned.module).cloned() else {
            continue;
        };
        let mut changed = false;
        for name in &planned.dependencies {
            let Some(dependency) = app.module_by_name(name) else {
                continue;
            };
            if dependency.id != module.id && !module.dependencies.contains(&dependency.id) {
                module.dependencies.push(dependency.id.clone());
                changed = true;
            }
        }
        if changed {
            app.upsert_module(module);
        }
    }
}

/// Sort planned tasks by the application's module order.
///
/// The stored graph wins over the plan; tasks of the same module keep their
/// planned order and tasks of unknown modules go last.
fn order_by_graph(app: &Application, tasks: &mut [PlannedTask]) -> EngineResult<()> {
    let positions: HashMap<&str, usize> = resolve_order(&app.modules)?
        .into_iter()
        .enumerate()
        .map(|(index, module)| (module.name.as_str(), index))
        .collect();
    tasks.sort_by_key(|t| positions.get(t.module.as_str()).copied().unwrap_or(usize::MAX));
    Ok(())
}

fn prefer(slot: &mut Option<String>, value: &Option<String>, preferred: bool) {
    if let Some(value) = value {
        if preferred || slot.is_none() {
            *slot = Some(value.clone());
        }
    }
}

/// Record a module's URLs on the exchange. UI modules win the product URL.
fn record_deployment(exchange: &mut Exchange, module: &Module, deployment: &Deployment) {
    let preferred = module.technology == Technology::Web;
    prefer(&mut exchange.product_url, &deployment.product_url, preferred);
    prefer(&mut exchange.management_url, &deployment.management_url, preferred);
    prefer(&mut exchange.source_url, &deployment.source_url, preferred);
}

pub struct GenerationService {
    config: EngineConfig,
    model: Arc<dyn Model>,
    exchanges: Arc<dyn ExchangeStore>,
    applications: Arc<dyn ApplicationStore>,
    workspaces: Arc<dyn WorkspaceProvider>,
    module_types: ModuleTypeRegistry,
    registry: Arc<ExchangeRegistry>,
    data_agent: Arc<dyn DataAgent>,
    testing: Option<BrowserTesting>,
}

impl GenerationService {
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn Model>,
        exchanges: Arc<dyn ExchangeStore>,
        applications: Arc<dyn ApplicationStore>,
        workspaces: Arc<dyn WorkspaceProvider>,
    ) -> Self {
        Self {
            config,
            model,
            exchanges,
            applications,
            workspaces,
            module_types: ModuleTypeRegistry::builtin(),
            registry: ExchangeRegistry::new(),
            data_agent: Arc::new(WorkspaceDataAgent),
            testing: None,
        }
    }

    pub fn with_module_types(mut self, module_types: ModuleTypeRegistry) -> Self {
        self.module_types = module_types;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ExchangeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_data_agent(mut self, data_agent: Arc<dyn DataAgent>) -> Self {
        self.data_agent = data_agent;
        self
    }

    /// Enable the browser test loop for testable modules.
    pub fn with_browser(mut self, browser: Arc<dyn Browser>, accounts: AccountStore) -> Self {
        self.testing = Some(BrowserTesting { browser, accounts });
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    /// Process a request to completion on the current task.
    pub async fn run(&self, request: GenerationRequest) -> EngineResult<GenerationOutcome> {
        let run = self.prepare(request).await?;
        self.execute(run).await
    }

    /// Register the exchange and process it on a spawned task.
    pub async fn start(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> EngineResult<(ExchangeId, JoinHandle<EngineResult<GenerationOutcome>>)> {
        let run = self.prepare(request).await?;
        let exchange_id = run.exchange.id.clone();
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move { service.execute(run).await });
        Ok((exchange_id, handle))
    }

    pub async fn submit(
        self: &Arc<Self>,
        request: GenerationRequest,
        dispatch: Dispatch,
    ) -> EngineResult<Submission> {
        match dispatch {
            Dispatch::Inline => Ok(Submission::Finished(self.run(request).await?)),
            Dispatch::Background => {
                let (exchange_id, handle) = self.start(request).await?;
                Ok(Submission::Started {
                    exchange_id,
                    handle,
                })
            }
        }
    }

    /// Request cancellation of a running exchange.
    pub fn cancel(&self, exchange_id: &str) -> bool {
        let found = self.registry.cancel(exchange_id);
        if found {
            info!("Cancellation requested for exchange {}", exchange_id);
        }
        found
    }

    /// Receive the progress of a running exchange, replacing any previous listener.
    pub fn attach(&self, exchange_id: &str) -> Option<UnboundedReceiver<ProgressEvent>> {
        self.registry.attach(exchange_id)
    }

    pub async fn exchange(&self, exchange_id: &str) -> EngineResult<Exchange> {
        Ok(self.exchanges.get_exchange(exchange_id).await?)
    }

    pub async fn exchanges(&self, query: &ExchangeQuery) -> EngineResult<Vec<Exchange>> {
        Ok(self.exchanges.search_exchanges(query).await?)
    }

    /// Fail running exchanges whose heartbeat expired.
    pub async fn sweep(&self) -> EngineResult<Vec<ExchangeId>> {
        Ok(expire_stale(self.exchanges.as_ref(), self.config.heartbeat_timeout(), Utc::now()).await?)
    }

    /// Undo the commits of a finished exchange, newest module first.
    pub async fn revert(&self, exchange_id: &str) -> EngineResult<Exchange> {
        let mut exchange = self.exchanges.get_exchange(exchange_id).await?;
        if !exchange.status.can_transition_to(ExchangeStatus::Reverted) {
            return Err(CoreError::InvalidTransition {
                from: exchange.status,
                to: ExchangeStatus::Reverted,
            }
            .into());
        }
        let app = self
            .applications
            .get_application(&exchange.application_id)
            .await?;

        for task in exchange.tasks.iter().rev().filter(|t| t.committed) {
            let Some(module) = app.module(&task.module_id) else {
                warn!("Module {} no longer exists, not reverting it", task.module_name);
                continue;
            };
            let module_type = self.module_type(module)?;
            info!("Reverting module {} of exchange {}", module.name, exchange.id);
            self.workspaces
                .workspace(&app.id, module, &module_type)
                .revert()
                .await?;
        }

        exchange.transition(ExchangeStatus::Reverted)?;
        self.exchanges.save_exchange(&exchange).await?;
        info!("Exchange {} reverted", exchange.id);
        Ok(exchange)
    }

    fn module_type(&self, module: &Module) -> EngineResult<ModuleType> {
        self.module_types
            .resolve(&module.module_type, module.technology)
            .cloned()
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "module {} has unknown module type {}",
                    module.name, module.module_type
                ))
            })
    }

    fn agent(&self, job: &ModuleJob) -> CodeAgent {
        CodeAgent::new(
            self.model.as_ref(),
            job.module.clone(),
            job.module_type.clone(),
            self.config.retry_policy(),
        )
    }

    async fn load_application(&self, request: &GenerationRequest) -> EngineResult<(Application, bool)> {
        if let Some(id) = &request.application_id {
            return Ok((self.applications.get_application(id).await?, false));
        }

        let name = request
            .application_name
            .clone()
            .unwrap_or_else(|| default_app_name(&request.requirement));
        let api = Module::new("api", Technology::Kiwi).with_description("Backend API");
        let web = Module::new("web", Technology::Web)
            .with_description("Web user interface")
            .depends_on(api.id.as_str());
        let app = Application::new(name, request.requester_id.as_str())
            .with_module(api)
            .with_module(web);
        self.applications.save_application(&app).await?;
        info!("Created application {} ({})", app.name, app.id);
        Ok((app, true))
    }

    async fn prepare(&self, request: GenerationRequest) -> EngineResult<Run> {
        let (app, first) = self.load_application(&request).await?;
        let exchange = Exchange::new(
            app.id.as_str(),
            request.requester_id.as_str(),
            request.requirement.as_str(),
            first,
        )
        .with_attachments(request.attachments.iter().map(|a| a.name.clone()).collect());
        let handle = self.registry.register(exchange.id.clone())?;
        info!(
            "Exchange {} created for application {} (first: {})",
            exchange.id, app.name, first
        );

        let mut run = Run {
            exchange,
            app,
            request,
            handle,
        };
        self.save(&mut run).await?;
        Ok(run)
    }

    async fn execute(&self, mut run: Run) -> EngineResult<GenerationOutcome> {
        let _heartbeat = self.spawn_heartbeat(run.exchange.id.clone());
        let fault = match self.generate(&mut run).await {
            Ok(()) => None,
            Err(err) => Some(self.finish(&mut run, err).await?),
        };
        Ok(GenerationOutcome {
            exchange: run.exchange,
            fault,
        })
    }

    /// Refresh the stored heartbeat until the guard drops.
    fn spawn_heartbeat(&self, exchange_id: ExchangeId) -> DropGuard {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let store = Arc::clone(&self.exchanges);
        let interval = self.config.heartbeat_interval();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = store.touch_exchange(&exchange_id, Utc::now()).await {
                            warn!("Heartbeat of exchange {} failed: {}", exchange_id, e);
                        }
                    }
                }
            }
        });
        stop.drop_guard()
    }

    /// Save and publish the exchange.
    async fn save(&self, run: &mut Run) -> EngineResult<()> {
        run.exchange.heartbeat();
        self.exchanges.save_exchange(&run.exchange).await?;
        run.handle.sink().emit(ProgressEvent::exchange(&run.exchange));
        Ok(())
    }

    /// Save after a cancellation checkpoint.
    async fn persist(&self, run: &mut Run) -> EngineResult<()> {
        run.handle.checkpoint()?;
        self.save(run).await
    }

    /// Record a fault on the exchange and return it with the exchange id filled in.
    async fn finish(&self, run: &mut Run, err: EngineError) -> EngineResult<EngineError> {
        let err = match err {
            EngineError::Cancelled(_) => EngineError::Cancelled(run.exchange.id.clone()),
            other => other,
        };

        if err.is_cancelled() {
            warn!("Exchange {} cancelled", run.exchange.id);
            if let Some(attempt) = run
                .exchange
                .current_task_mut()
                .and_then(|t| t.current_attempt_mut())
            {
                if !attempt.is_terminal() {
                    attempt.fail("cancelled")?;
                }
            }
            if run.exchange.is_running() {
                run.exchange.transition(ExchangeStatus::Cancelled)?;
            }
        } else {
            error!("Exchange {} failed: {}", run.exchange.id, err);
            let message = err.to_string();
            if let Some(task) = run.exchange.current_task_mut() {
                if matches!(task.status, TaskStatus::Generating | TaskStatus::Testing) {
                    task.fail(message.clone());
                }
            }
            if run.exchange.is_running() {
                run.exchange.fail(message)?;
            }
        }

        self.save(run).await?;
        Ok(err)
    }

    async fn generate(&self, run: &mut Run) -> EngineResult<()> {
        // A cycle is a configuration fault and must surface before any model call.
        resolve_order(&run.app.modules)?;

        let plan = self.plan(run).await?;
        let mut tasks: Vec<PlannedTask> = plan.ordered()?.into_iter().cloned().collect();
        apply_plan(&mut run.app, &tasks);
        order_by_graph(&run.app, &mut tasks)?;
        self.applications.save_application(&run.app).await?;

        run.exchange.transition(ExchangeStatus::Generating)?;
        self.persist(run).await?;

        let total = tasks.len();
        for (index, planned) in tasks.into_iter().enumerate() {
            run.handle.checkpoint()?;
            let Some(module) = run.app.module_by_name(&planned.module).cloned() else {
                warn!("Skipping {} of unknown module {}", planned.kind.as_str(), planned.module);
                continue;
            };
            let module_type = self.module_type(&module)?;
            let compiler = self.workspaces.workspace(&run.app.id, &module, &module_type);
            let job = ModuleJob {
                planned,
                module,
                module_type,
                compiler,
            };

            info!(
                "Executing task [{}/{}]: {} {}",
                index + 1,
                total,
                job.planned.kind.as_str(),
                job.module.name
            );
            run.exchange.start_task(job.module.id.as_str(), job.module.name.as_str());
            self.persist(run).await?;

            if let Err(err) = self.run_task(run, &job).await {
                if let Err(e) = job.compiler.discard().await {
                    warn!("Could not discard changes of {}: {}", job.module.name, e);
                }
                return Err(err);
            }
        }

        run.handle.checkpoint()?;
        run.exchange.transition(ExchangeStatus::Successful)?;
        self.save(run).await?;
        info!(
            "Exchange {} completed: {}",
            run.exchange.id,
            run.exchange.product_url.as_deref().unwrap_or("(no product URL)")
        );
        Ok(())
    }

    async fn plan(&self, run: &Run) -> EngineResult<Plan> {
        if self.config.mode == PipelineMode::Single || run.exchange.first {
            debug!("Planning: every module of {} is modified", run.app.name);
            return Ok(Plan::modify_all(&run.app, &run.request.requirement));
        }

        info!("Planning changes to {}", run.app.name);
        let args = PromptArgs::new()
            .with("application", run.app.name.as_str())
            .with("modules", describe_modules(&run.app))
            .with("requirement", run.request.requirement.as_str());
        let prompt = render(PromptKind::Plan.default_text(), &args)?;
        let plan = request_plan(
            self.model.as_ref(),
            &prompt,
            &run.request.attachments,
            &self.config.retry_policy(),
            run.handle.sink(),
            run.handle.cancel_token(),
        )
        .await?;
        debug!("Plan has {} task(s)", plan.tasks.len());
        Ok(plan)
    }

    async fn run_task(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        match job.planned.kind {
            TaskKind::Create | TaskKind::Modify => self.generate_module(run, job).await,
            TaskKind::Delete => self.delete_module(run, job).await,
            TaskKind::Data => self.manipulate_data(run, job).await,
            TaskKind::Test => self.test_module(run, job).await,
        }
    }

    /// Source of the module, initializing its workspace on first use.
    async fn prepare_workspace(&self, job: &ModuleJob) -> EngineResult<String> {
        let mut files = job.compiler.source_files().await?;
        if files.is_empty() {
            let manifest = &job.module_type.manifest;
            info!(
                "Initializing workspace {} from {}",
                job.compiler.key(),
                manifest.template_repo.as_deref().unwrap_or("(empty)")
            );
            job.compiler
                .reset(manifest.template_repo.as_deref(), &manifest.branch)
                .await?;
            files = job.compiler.source_files().await?;
        }
        Ok(render_files(&files)?)
    }

    async fn dependency_sources(&self, app: &Application, module: &Module) -> EngineResult<String> {
        let mut sections = Vec::new();
        for id in &module.dependencies {
            let Some(dependency) = app.module(id) else {
                continue;
            };
            let module_type = self.module_type(dependency)?;
            let files = self
                .workspaces
                .workspace(&app.id, dependency, &module_type)
                .source_files()
                .await?;
            if !files.is_empty() {
                let rendered = render_files(&files)?;
                sections.push(format!("Module {}:\n{}", dependency.name, rendered));
            }
        }
        Ok(sections.join("\n"))
    }

    async fn generate_module(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        let agent = self.agent(job);
        let context = GenerationContext {
            requirement: run.request.requirement.clone(),
            suggestion: job.planned.suggestion.clone(),
            source: self.prepare_workspace(job).await?,
            dependencies: self.dependency_sources(&run.app, &job.module).await?,
        };
        let prompt = agent.generation_prompt(&context)?;
        let attachments = run.request.attachments.clone();
        self.fix_loop(run, job, &agent, prompt, attachments, Apply::Build)
            .await?;

        let url = self.deploy(run, job).await?;
        if job.module_type.is_testable() {
            match &self.testing {
                Some(testing) => {
                    self.test_rounds(run, job, &agent, testing, url).await?;
                }
                None => debug!("No browser configured, not testing {}", job.module.name),
            }
        }
        self.commit(run, job).await
    }

    async fn manipulate_data(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        let agent = self.agent(job);
        let context = GenerationContext {
            requirement: run.request.requirement.clone(),
            suggestion: job.planned.suggestion.clone(),
            source: render_files(&job.compiler.source_files().await?)?,
            dependencies: String::new(),
        };
        let prompt = agent.data_prompt(&context)?;
        let attachments = run.request.attachments.clone();
        self.fix_loop(run, job, &agent, prompt, attachments, Apply::Data)
            .await?;
        self.commit(run, job).await
    }

    async fn delete_module(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        task_mut(&mut run.exchange)?.start_attempt();
        self.persist(run).await?;

        info!("Deleting module {}", job.module.name);
        job.compiler.delete().await?;
        run.app.remove_module(&job.module.id);
        self.applications.save_application(&run.app).await?;

        let task = task_mut(&mut run.exchange)?;
        task.succeed_attempt()?;
        task.set_status(TaskStatus::Successful);
        self.persist(run).await
    }

    async fn test_module(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        let Some(testing) = &self.testing else {
            warn!("No browser configured, cannot test {}", job.module.name);
            let task = task_mut(&mut run.exchange)?;
            task.set_status(TaskStatus::Successful);
            task.error = Some("not tested: no browser configured".to_string());
            return self.persist(run).await;
        };
        let agent = self.agent(job);
        let url = self.deploy(run, job).await?;
        let fixed = self.test_rounds(run, job, &agent, testing, url).await?;
        if fixed {
            self.commit(run, job).await
        } else {
            task_mut(&mut run.exchange)?.set_status(TaskStatus::Successful);
            self.persist(run).await
        }
    }

    /// Bounded generate-and-build loop in one chat session.
    ///
    /// Build failures and unparsable replies are fed back to the model; each
    /// try is one attempt on the current task.
    async fn fix_loop(
        &self,
        run: &mut Run,
        job: &ModuleJob,
        agent: &CodeAgent,
        mut prompt: String,
        mut attachments: Vec<Attachment>,
        apply: Apply,
    ) -> EngineResult<()> {
        let max = self.config.max_fix_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max {
            {
                let task = task_mut(&mut run.exchange)?;
                task.set_status(TaskStatus::Generating);
                task.start_attempt();
            }
            self.persist(run).await?;
            info!("Generating {} [attempt {}/{}]", job.module.name, attempt, max);

            let reply = agent
                .ask(&prompt, &attachments, run.handle.sink(), run.handle.cancel_token())
                .await?;
            attachments.clear();

            let failure = match CodeAgent::parse_reply(&reply) {
                Err(e) => format!("Your reply could not be parsed: {}", e),
                Ok(patch) => {
                    let cancel = run.handle.cancel_token();
                    let outcome = match apply {
                        Apply::Build => {
                            job.compiler
                                .run(&patch.added, &patch.removed, cancel)
                                .await?
                        }
                        Apply::Data => {
                            self.data_agent
                                .apply(job.compiler.as_ref(), &patch, cancel)
                                .await?
                        }
                    };
                    if outcome.successful {
                        info!("Module {} built on attempt {}", job.module.name, attempt);
                        task_mut(&mut run.exchange)?.succeed_attempt()?;
                        return self.persist(run).await;
                    }
                    outcome.output
                }
            };

            warn!(
                "Attempt {}/{} for {} failed: {}",
                attempt,
                max,
                job.module.name,
                first_line(&failure)
            );
            task_mut(&mut run.exchange)?.fail_attempt(failure.clone())?;
            self.persist(run).await?;

            if attempt < max {
                let source = render_files(&job.compiler.source_files().await?)?;
                prompt = agent.fix_prompt(&failure, &source)?;
            }
            last_error = failure;
        }

        error!("Module {} failed after {} attempts", job.module.name, max);
        task_mut(&mut run.exchange)?.fail(last_error.clone());
        Err(EngineError::GenerationFailed {
            module: job.module.name.clone(),
            attempts: max,
            last_error,
        })
    }

    async fn deploy(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<Option<String>> {
        run.handle.checkpoint()?;
        let deployment = job.compiler.deploy(run.handle.cancel_token()).await?;
        info!(
            "Deployed {} to {}",
            job.module.name,
            deployment.product_url.as_deref().unwrap_or("(no URL)")
        );
        record_deployment(&mut run.exchange, &job.module, &deployment);
        Ok(deployment.product_url)
    }

    async fn commit(&self, run: &mut Run, job: &ModuleJob) -> EngineResult<()> {
        run.handle.checkpoint()?;
        let message = format!(
            "{} {}: {}",
            job.planned.kind.as_str(),
            job.module.name,
            first_line(&run.request.requirement)
        );
        job.compiler.commit(&message).await?;

        let task = task_mut(&mut run.exchange)?;
        task.committed = true;
        task.set_status(TaskStatus::Successful);
        self.persist(run).await
    }

    async fn test_session(
        &self,
        run: &Run,
        job: &ModuleJob,
        testing: &BrowserTesting,
        url: &str,
    ) -> EngineResult<TestResult> {
        let session = TestSession {
            application_id: run.app.id.clone(),
            module: job.module.name.clone(),
            requirement: run.request.requirement.clone(),
            source: render_files(&job.compiler.source_files().await?)?,
        };
        let source_maps = SourceMaps::from_files(
            job.compiler
                .source_maps()
                .await?
                .into_iter()
                .map(|f| (f.path, f.content)),
        );
        let driver = TestLoopDriver::new(Arc::clone(&self.model), testing.accounts.clone())
            .with_template(job.module_type.prompt(PromptKind::Test))
            .with_max_steps(self.config.max_test_steps)
            .with_retry(self.config.retry_policy())
            .with_source_maps(source_maps);

        let page = testing.browser.open(url).await?;
        let result = driver
            .run(page.as_ref(), &session, run.handle.sink(), run.handle.cancel_token())
            .await;
        if let Err(e) = page.close().await {
            warn!("Could not close page of {}: {}", job.module.name, e);
        }
        Ok(result?)
    }

    /// Test a deployed module; rejections trigger a fix and a re-test.
    ///
    /// Returns whether a fix was applied.
    async fn test_rounds(
        &self,
        run: &mut Run,
        job: &ModuleJob,
        agent: &CodeAgent,
        testing: &BrowserTesting,
        mut url: Option<String>,
    ) -> EngineResult<bool> {
        let rounds = self.config.max_test_rounds;
        let mut fixed = false;

        for round in 1..=rounds {
            {
                let task = task_mut(&mut run.exchange)?;
                task.set_status(TaskStatus::Testing);
                task.start_attempt();
            }
            self.persist(run).await?;
            info!("Testing {} [round {}/{}]", job.module.name, round, rounds);

            let result = match url.as_deref() {
                Some(target) => self.test_session(run, job, testing, target).await?,
                None => TestResult::Aborted {
                    reason: "the module has no product URL".to_string(),
                },
            };

            match result {
                TestResult::Accepted { summary } => {
                    info!("Module {} accepted: {}", job.module.name, summary);
                    task_mut(&mut run.exchange)?.succeed_attempt()?;
                    self.persist(run).await?;
                    return Ok(fixed);
                }
                TestResult::Aborted { reason } => {
                    warn!("Testing of {} aborted: {}", job.module.name, reason);
                    let task = task_mut(&mut run.exchange)?;
                    task.fail_attempt(reason.clone())?;
                    task.error = Some(format!("testing aborted: {}", reason));
                    self.persist(run).await?;
                    return Ok(fixed);
                }
                TestResult::Rejected(rejection) => {
                    {
                        let task = task_mut(&mut run.exchange)?;
                        task.fail_attempt(rejection.report.clone())?;
                        task.set_status(TaskStatus::Rejected);
                    }
                    self.persist(run).await?;

                    if round == rounds {
                        let message = format!("rejected by testing: {}", rejection.report);
                        task_mut(&mut run.exchange)?.fail(message);
                        return Err(EngineError::GenerationFailed {
                            module: job.module.name.clone(),
                            attempts: rounds,
                            last_error: rejection.report,
                        });
                    }

                    let console = if rejection.console.trim().is_empty() {
                        "(empty)"
                    } else {
                        rejection.console.as_str()
                    };
                    let error = format!(
                        "Browser testing rejected the module:\n{}\n\nConsole log:\n{}",
                        rejection.report, console
                    );
                    let source = render_files(&job.compiler.source_files().await?)?;
                    let prompt = agent.fix_prompt(&error, &source)?;
                    let attachments = if rejection.screenshot.is_empty() {
                        Vec::new()
                    } else {
                        vec![Attachment::png("rejected.png", rejection.screenshot)]
                    };
                    self.fix_loop(run, job, agent, prompt, attachments, Apply::Build)
                        .await?;
                    fixed = true;
                    url = self.deploy(run, job).await?;
                }
            }
        }
        Ok(fixed)
    }
}
