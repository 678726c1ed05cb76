//! Scripted agents for tests
//!
//! Enabled inside this crate's tests and, for downstream crates, through the
//! `testing` feature.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln_core::{LiteralMap, TaskTemplate};

use crate::error::{AgentError, Result};
use crate::template::OUTPUTS_FILE;
use crate::traits::{AsyncAgent, SyncAgent};
use crate::types::{AgentContext, CreateTaskResponse, LogLink, Resource, ResourceMeta, State};

/// Call counters and captured arguments, shared with the test body
#[derive(Debug, Default)]
pub struct AgentCalls {
    creates: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    last_prefix: Mutex<Option<String>>,
    last_args: Mutex<Vec<String>>,
}

impl AgentCalls {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Output prefix passed to the most recent create
    pub fn last_prefix(&self) -> Option<String> {
        self.last_prefix.lock().ok().and_then(|p| p.clone())
    }

    /// Container args of the template passed to the most recent create
    pub fn last_args(&self) -> Vec<String> {
        self.last_args.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

/// Agent that replays a fixed script of states
///
/// Registered with either `register_async` or `register_sync`; the same
/// script drives both variants.
pub struct ScriptedAgent {
    task_type: String,
    script: Mutex<VecDeque<Resource>>,
    final_resource: Resource,
    immediate: Option<Resource>,
    reject: Option<String>,
    staged_outputs: Option<LiteralMap>,
    fail_deletes: bool,
    delete_delay: Option<Duration>,
    calls: Arc<AgentCalls>,
}

impl ScriptedAgent {
    /// Agent that succeeds on the first poll with no outputs
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            script: Mutex::new(VecDeque::new()),
            final_resource: Resource::new(State::Succeeded),
            immediate: None,
            reject: None,
            staged_outputs: None,
            fail_deletes: false,
            delete_delay: None,
            calls: Arc::new(AgentCalls::default()),
        }
    }

    /// Report `RUNNING` for the first `polls` gets
    pub fn running_for(self, polls: u32) -> Self {
        if polls == u32::MAX {
            // Never finishes
            return Self {
                final_resource: Resource::new(State::Running),
                ..self
            };
        }
        if let Ok(mut script) = self.script.lock() {
            script.extend((0..polls).map(|_| Resource::new(State::Running)));
        }
        self
    }

    /// Finish with `SUCCEEDED` and these inline outputs
    pub fn succeeding_with(mut self, outputs: LiteralMap) -> Self {
        self.final_resource = Resource::new(State::Succeeded)
            .with_outputs(outputs)
            .with_log_link(LogLink::new("console", format!("https://{}/jobs/1", self.task_type)));
        self
    }

    /// Finish with `FAILED` and this message
    pub fn failing_with(mut self, message: &str) -> Self {
        self.final_resource = Resource::new(State::Failed).with_message(message);
        self
    }

    /// Return a finished resource straight from create
    pub fn completing_at_create(mut self, outputs: LiteralMap) -> Self {
        self.immediate = Some(Resource::new(State::Succeeded).with_outputs(outputs));
        self
    }

    /// Refuse every create
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject = Some(message.to_string());
        self
    }

    /// Write outputs to `<prefix>/output/outputs.pb` during create
    pub fn writing_staged_outputs(mut self, outputs: LiteralMap) -> Self {
        self.staged_outputs = Some(outputs);
        self
    }

    /// Make every delete return an error
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Take `delay` to answer each delete
    pub fn deleting_after(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Handle to the call counters; stays valid after the agent is registered
    pub fn calls(&self) -> Arc<AgentCalls> {
        self.calls.clone()
    }

    fn do_create(
        &self,
        output_prefix: &str,
        template: &TaskTemplate,
    ) -> Result<CreateTaskResponse> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prefix) = self.calls.last_prefix.lock() {
            *prefix = Some(output_prefix.to_string());
        }
        if let Ok(mut args) = self.calls.last_args.lock() {
            *args = template
                .container
                .as_ref()
                .map(|c| c.args.clone())
                .unwrap_or_default();
        }

        if let Some(message) = &self.reject {
            return Err(AgentError::Rejected(message.clone()));
        }

        if let Some(outputs) = &self.staged_outputs {
            let path = Path::new(output_prefix).join(OUTPUTS_FILE);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| AgentError::blob(parent, e))?;
            }
            std::fs::write(&path, serde_json::to_vec(outputs)?)
                .map_err(|e| AgentError::blob(&path, e))?;
        }

        let meta = ResourceMeta::new(format!("{}-job", self.task_type).into_bytes());
        Ok(match &self.immediate {
            Some(resource) => CreateTaskResponse::completed(meta, resource.clone()),
            None => CreateTaskResponse::pending(meta),
        })
    }

    fn do_get(&self) -> Result<Resource> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        Ok(next.unwrap_or_else(|| self.final_resource.clone()))
    }

    fn finish_delete(&self) -> Result<()> {
        if self.fail_deletes {
            return Err(AgentError::Rpc("delete timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AsyncAgent for ScriptedAgent {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    async fn create(
        &self,
        _ctx: &AgentContext,
        output_prefix: &str,
        template: &TaskTemplate,
        _inputs: &LiteralMap,
    ) -> Result<CreateTaskResponse> {
        self.do_create(output_prefix, template)
    }

    async fn get(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<Resource> {
        self.do_get()
    }

    async fn delete(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        self.finish_delete()
    }
}

impl SyncAgent for ScriptedAgent {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn create(
        &self,
        _ctx: &AgentContext,
        output_prefix: &str,
        template: &TaskTemplate,
        _inputs: &LiteralMap,
    ) -> Result<CreateTaskResponse> {
        self.do_create(output_prefix, template)
    }

    fn get(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<Resource> {
        self.do_get()
    }

    fn delete(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<()> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delete_delay {
            std::thread::sleep(delay);
        }
        self.finish_delete()
    }
}
