//! Agent capability traits
//!
//! A backend implements exactly one of [`AsyncAgent`] or [`SyncAgent`]. The
//! [`Agent`] enum wraps either and gives the controller one async surface;
//! blocking backends are driven from tokio's blocking pool so they never
//! stall other executions.

use std::sync::Arc;

use kiln_core::{LiteralMap, TaskTemplate};

use crate::error::Result;
use crate::types::{AgentContext, CreateTaskResponse, Resource, ResourceMeta};

/// Backend whose calls suspend on I/O
#[async_trait::async_trait]
pub trait AsyncAgent: Send + Sync {
    /// Task type tag this agent serves
    fn task_type(&self) -> &str;

    /// Start a unit of work
    async fn create(
        &self,
        ctx: &AgentContext,
        output_prefix: &str,
        template: &TaskTemplate,
        inputs: &LiteralMap,
    ) -> Result<CreateTaskResponse>;

    /// Fetch the current state of a unit of work
    async fn get(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<Resource>;

    /// Tear down a unit of work
    async fn delete(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<()>;
}

/// Backend whose calls block until they complete
pub trait SyncAgent: Send + Sync {
    /// Task type tag this agent serves
    fn task_type(&self) -> &str;

    /// Start a unit of work, usually returning the finished resource
    fn create(
        &self,
        ctx: &AgentContext,
        output_prefix: &str,
        template: &TaskTemplate,
        inputs: &LiteralMap,
    ) -> Result<CreateTaskResponse>;

    /// Fetch the current state of a unit of work
    fn get(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<Resource>;

    /// Tear down a unit of work
    fn delete(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<()>;
}

/// A registered backend, in either variant
#[derive(Clone)]
pub enum Agent {
    Async(Arc<dyn AsyncAgent>),
    Sync(Arc<dyn SyncAgent>),
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = if self.is_asynchronous() { "Async" } else { "Sync" };
        write!(f, "Agent::{}({})", variant, self.task_type())
    }
}

impl Agent {
    pub fn from_async<A: AsyncAgent + 'static>(agent: A) -> Self {
        Self::Async(Arc::new(agent))
    }

    pub fn from_sync<A: SyncAgent + 'static>(agent: A) -> Self {
        Self::Sync(Arc::new(agent))
    }

    pub fn task_type(&self) -> &str {
        match self {
            Agent::Async(a) => a.task_type(),
            Agent::Sync(a) => a.task_type(),
        }
    }

    pub fn is_asynchronous(&self) -> bool {
        matches!(self, Agent::Async(_))
    }

    pub async fn create(
        &self,
        ctx: &AgentContext,
        output_prefix: &str,
        template: &TaskTemplate,
        inputs: &LiteralMap,
    ) -> Result<CreateTaskResponse> {
        match self {
            Agent::Async(agent) => agent.create(ctx, output_prefix, template, inputs).await,
            Agent::Sync(agent) => {
                let agent = agent.clone();
                let ctx = ctx.clone();
                let output_prefix = output_prefix.to_string();
                let template = template.clone();
                let inputs = inputs.clone();
                tokio::task::spawn_blocking(move || {
                    agent.create(&ctx, &output_prefix, &template, &inputs)
                })
                .await?
            }
        }
    }

    pub async fn get(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<Resource> {
        match self {
            Agent::Async(agent) => agent.get(ctx, resource_meta).await,
            Agent::Sync(agent) => {
                let agent = agent.clone();
                let ctx = ctx.clone();
                let meta = resource_meta.clone();
                tokio::task::spawn_blocking(move || agent.get(&ctx, &meta)).await?
            }
        }
    }

    pub async fn delete(&self, ctx: &AgentContext, resource_meta: &ResourceMeta) -> Result<()> {
        match self {
            Agent::Async(agent) => agent.delete(ctx, resource_meta).await,
            Agent::Sync(agent) => {
                let agent = agent.clone();
                let ctx = ctx.clone();
                let meta = resource_meta.clone();
                tokio::task::spawn_blocking(move || agent.delete(&ctx, &meta)).await?
            }
        }
    }
}
