//! Remote task lifecycle controller
//!
//! Drives one execution through
//! `Init -> Creating -> Created -> [Polling] -> Terminal`, or into
//! `Deleting -> Aborted` when the cancellation token fires first.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use kiln_core::config::AgentConfig;
use kiln_core::{JsonConverter, LiteralMap, TaskTemplate, ValueConverter};

use crate::blob::{read_literal_map, write_literal_map, BlobStore};
use crate::error::ExecutionError;
use crate::registry::AgentRegistry;
use crate::reporter::{LifecycleEvent, LifecycleReporter, TracingReporter};
use crate::template::{render_task_template, INPUTS_FILE, OUTPUTS_FILE};
use crate::traits::Agent;
use crate::types::{AgentContext, CreateTaskResponse, Resource, ResourceMeta, State};

type ExecResult<T> = std::result::Result<T, ExecutionError>;

/// What to run remotely
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub template: TaskTemplate,

    /// Upload inputs to `<prefix>/inputs.pb` and render arg placeholders
    /// before create
    pub stage_inputs: bool,
}

impl TaskDescription {
    pub fn new(template: TaskTemplate) -> Self {
        Self {
            template,
            stage_inputs: false,
        }
    }

    pub fn with_staged_inputs(mut self) -> Self {
        self.stage_inputs = true;
        self
    }

    pub fn name(&self) -> &str {
        self.template.name()
    }
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Delay before every status poll
    pub poll_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }
}

/// Where an execution currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Creating,
    Created,
    Polling,
    Terminal,
    Deleting,
    Aborted,
}

/// State owned by one execution; never shared between executions
struct Execution {
    task: String,
    agent: Agent,
    ctx: AgentContext,
    output_prefix: String,
    phase: Phase,
    resource_meta: ResourceMeta,
    cleanup: Option<JoinHandle<bool>>,
}

impl Execution {
    fn new(task: &str, agent: Agent, output_prefix: String) -> Self {
        Self {
            task: task.to_string(),
            agent,
            ctx: AgentContext::new(task),
            output_prefix,
            phase: Phase::Init,
            resource_meta: ResourceMeta::default(),
            cleanup: None,
        }
    }

    fn staged_path(&self, file: &str) -> String {
        format!("{}/{}", self.output_prefix.trim_end_matches('/'), file)
    }

    fn transition(&mut self, next: Phase) {
        debug!(task = %self.task, from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }

    /// Enter `Deleting`. Returns false when a cleanup already started.
    fn begin_cleanup(&mut self) -> bool {
        if self.cleanup.is_some() || matches!(self.phase, Phase::Deleting | Phase::Aborted) {
            return false;
        }
        self.transition(Phase::Deleting);
        true
    }
}

/// Runs tasks on registered agents
pub struct LifecycleController {
    registry: Arc<AgentRegistry>,
    blobs: Arc<dyn BlobStore>,
    converter: Arc<dyn ValueConverter>,
    reporter: Arc<dyn LifecycleReporter>,
    options: ControllerOptions,
}

impl LifecycleController {
    pub fn new(registry: Arc<AgentRegistry>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            registry,
            blobs,
            converter: Arc::new(JsonConverter),
            reporter: Arc::new(TracingReporter),
            options: ControllerOptions::default(),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Convert native inputs and run the task to completion
    pub async fn execute(
        &self,
        task: &TaskDescription,
        inputs: &BTreeMap<String, Value>,
        cancel: &CancellationToken,
    ) -> ExecResult<LiteralMap> {
        let literals = self
            .converter
            .to_literal_map(inputs, &task.template.interface.inputs)
            .map_err(|source| ExecutionError::Conversion {
                task: task.name().to_string(),
                source,
            })?;
        self.execute_literals(task, &literals, cancel).await
    }

    /// Run the task with inputs already in literal form
    #[instrument(skip_all, fields(task = %task.name(), task_type = %task.template.task_type))]
    pub async fn execute_literals(
        &self,
        task: &TaskDescription,
        inputs: &LiteralMap,
        cancel: &CancellationToken,
    ) -> ExecResult<LiteralMap> {
        let name = task.name();
        let agent = self
            .registry
            .get(&task.template.task_type)
            .ok_or_else(|| ExecutionError::NoAgent {
                task: name.to_string(),
                task_type: task.template.task_type.clone(),
            })?;

        let mut run = Execution::new(name, agent, self.blobs.random_remote_directory());
        let response = self.create(&mut run, task, inputs).await?;

        let resource = match response.terminal() {
            Some(resource) => resource.clone(),
            None => {
                // An interrupt during create is honored once the handle exists
                if cancel.is_cancelled() {
                    return Err(self.cancel(&mut run).await);
                }
                self.poll(&mut run, cancel).await?
            }
        };

        self.finish(&mut run, &resource)?;
        self.fetch_result(&run, task, resource).await
    }

    async fn create(
        &self,
        run: &mut Execution,
        task: &TaskDescription,
        inputs: &LiteralMap,
    ) -> ExecResult<CreateTaskResponse> {
        run.transition(Phase::Creating);

        let template = if task.stage_inputs {
            let remote = run.staged_path(INPUTS_FILE);
            write_literal_map(self.blobs.as_ref(), inputs, &remote)
                .await
                .map_err(|source| ExecutionError::Staging {
                    task: run.task.clone(),
                    source,
                })?;
            self.reporter.report(&LifecycleEvent::InputsStaged {
                task: run.task.clone(),
                remote_path: remote,
            });
            Cow::Owned(render_task_template(&task.template, &run.output_prefix))
        } else {
            Cow::Borrowed(&task.template)
        };

        self.reporter.report(&LifecycleEvent::Creating {
            task: run.task.clone(),
            task_type: run.agent.task_type().to_string(),
            asynchronous: run.agent.is_asynchronous(),
        });

        let response = run
            .agent
            .create(&run.ctx, &run.output_prefix, &template, inputs)
            .await
            .map_err(|e| ExecutionError::BackendRejected {
                task: run.task.clone(),
                message: e.to_string(),
            })?;

        run.resource_meta = response.resource_meta.clone();
        run.transition(Phase::Created);
        self.reporter.report(&LifecycleEvent::Created {
            task: run.task.clone(),
            completed: response.terminal().is_some(),
        });
        Ok(response)
    }

    /// Poll until a terminal state, or clean up when `cancel` fires
    async fn poll(&self, run: &mut Execution, cancel: &CancellationToken) -> ExecResult<Resource> {
        run.transition(Phase::Polling);
        let mut attempt: u32 = 0;

        loop {
            let woke = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = tokio::time::sleep(self.options.poll_interval) => true,
            };
            if !woke {
                return Err(self.cancel(run).await);
            }

            attempt += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = run.agent.get(&run.ctx, &run.resource_meta) => Some(result),
            };
            let resource = match polled {
                Some(result) => result.map_err(|source| ExecutionError::Backend {
                    task: run.task.clone(),
                    source,
                })?,
                None => return Err(self.cancel(run).await),
            };

            self.reporter.report(&LifecycleEvent::Polled {
                task: run.task.clone(),
                state: resource.state,
                attempt,
            });

            if resource.state.is_terminal() {
                return Ok(resource);
            }
        }
    }

    /// Delete the remote work and report the execution as cancelled
    async fn cancel(&self, run: &mut Execution) -> ExecutionError {
        let cancelled = ExecutionError::Cancelled {
            task: run.task.clone(),
        };
        if !run.begin_cleanup() {
            debug!(task = %run.task, "cleanup already in flight");
            return cancelled;
        }
        self.reporter.report(&LifecycleEvent::CleanupScheduled {
            task: run.task.clone(),
        });

        let confirmed = if run.agent.is_asynchronous() {
            // Detached so the delete outlives a dropped caller
            let agent = run.agent.clone();
            let ctx = run.ctx.clone();
            let meta = run.resource_meta.clone();
            let task = run.task.clone();
            let handle = tokio::spawn(async move {
                match agent.delete(&ctx, &meta).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(task = %task, error = %e, "delete failed");
                        false
                    }
                }
            });
            run.cleanup = Some(handle);
            match run.cleanup.as_mut() {
                Some(handle) => handle.await.unwrap_or(false),
                None => false,
            }
        } else {
            match run.agent.delete(&run.ctx, &run.resource_meta).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(task = %run.task, error = %e, "delete failed");
                    false
                }
            }
        };

        if !confirmed {
            warn!(
                task = %run.task,
                "cancellation incomplete: remote resources for this task may have leaked"
            );
        }
        self.reporter.report(&LifecycleEvent::CleanupFinished {
            task: run.task.clone(),
            confirmed,
        });
        run.transition(Phase::Aborted);
        cancelled
    }

    fn finish(&self, run: &mut Execution, resource: &Resource) -> ExecResult<()> {
        run.transition(Phase::Terminal);
        self.reporter.report(&LifecycleEvent::Finished {
            task: run.task.clone(),
            state: resource.state,
            message: resource.message.clone(),
            log_links: resource.log_links.clone(),
        });

        if resource.state != State::Succeeded {
            return Err(ExecutionError::RemoteExecutionFailed {
                task: run.task.clone(),
                state: resource.state,
                message: resource.message.clone(),
                log_links: resource.log_links.clone(),
            });
        }
        Ok(())
    }

    async fn fetch_result(
        &self,
        run: &Execution,
        task: &TaskDescription,
        resource: Resource,
    ) -> ExecResult<LiteralMap> {
        let declared = &task.template.interface.outputs;
        let inline = resource.outputs.unwrap_or_default();
        if !inline.is_empty() || declared.is_empty() {
            return Ok(inline);
        }

        let remote = run.staged_path(OUTPUTS_FILE);
        self.reporter.report(&LifecycleEvent::ReadingStagedOutputs {
            task: run.task.clone(),
            remote_path: remote.clone(),
        });

        let staged = read_literal_map(self.blobs.as_ref(), &remote)
            .await
            .map_err(|e| ExecutionError::ResultUnavailable {
                task: run.task.clone(),
                reason: format!("no inline outputs and {} could not be read: {}", remote, e),
            })?;

        if let Some(missing) = declared.keys().find(|name| !staged.contains(name)) {
            return Err(ExecutionError::ResultUnavailable {
                task: run.task.clone(),
                reason: format!("output '{}' missing from {}", missing, remote),
            });
        }
        Ok(staged)
    }
}
