//! Agent registry

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::traits::{Agent, AsyncAgent, SyncAgent};

/// Registry of agents keyed by task type
///
/// Populated at startup and then only read; lookups happen once per
/// execution.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its task type, replacing any previous one
    pub fn register(&mut self, agent: Agent) {
        let task_type = agent.task_type().to_string();
        if self.agents.contains_key(&task_type) {
            warn!(task_type = %task_type, "replacing registered agent");
        }
        debug!(task_type = %task_type, asynchronous = agent.is_asynchronous(), "registering agent");
        self.agents.insert(task_type, agent);
    }

    /// Register an asynchronous agent
    pub fn register_async<A: AsyncAgent + 'static>(&mut self, agent: A) {
        self.register(Agent::from_async(agent));
    }

    /// Register a synchronous agent
    pub fn register_sync<A: SyncAgent + 'static>(&mut self, agent: A) {
        self.register(Agent::from_sync(agent));
    }

    /// Get the agent serving a task type
    pub fn get(&self, task_type: &str) -> Option<Agent> {
        let result = self.agents.get(task_type).cloned();
        debug!(task_type, found = result.is_some(), "looking up agent");
        result
    }

    /// Whether an agent serves this task type
    pub fn supports(&self, task_type: &str) -> bool {
        self.agents.contains_key(task_type)
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.agents.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{AgentContext, CreateTaskResponse, Resource, ResourceMeta, State};
    use kiln_core::{LiteralMap, TaskTemplate};

    struct MockAgent {
        task_type: String,
    }

    #[async_trait::async_trait]
    impl AsyncAgent for MockAgent {
        fn task_type(&self) -> &str {
            &self.task_type
        }

        async fn create(
            &self,
            _ctx: &AgentContext,
            _output_prefix: &str,
            _template: &TaskTemplate,
            _inputs: &LiteralMap,
        ) -> Result<CreateTaskResponse> {
            Ok(CreateTaskResponse::pending(ResourceMeta::default()))
        }

        async fn get(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<Resource> {
            Ok(Resource::new(State::Succeeded))
        }

        async fn delete(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<()> {
            Ok(())
        }
    }

    struct MockSyncAgent;

    impl SyncAgent for MockSyncAgent {
        fn task_type(&self) -> &str {
            "chat"
        }

        fn create(
            &self,
            _ctx: &AgentContext,
            _output_prefix: &str,
            _template: &TaskTemplate,
            _inputs: &LiteralMap,
        ) -> Result<CreateTaskResponse> {
            Ok(CreateTaskResponse::completed(
                ResourceMeta::default(),
                Resource::new(State::Succeeded),
            ))
        }

        fn get(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<Resource> {
            Ok(Resource::new(State::Succeeded))
        }

        fn delete(&self, _ctx: &AgentContext, _meta: &ResourceMeta) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("bigquery").is_none());
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry.register_async(MockAgent {
            task_type: "bigquery".to_string(),
        });
        registry.register_sync(MockSyncAgent);

        assert_eq!(registry.len(), 2);
        assert!(registry.supports("bigquery"));
        assert!(registry.get("bigquery").unwrap().is_asynchronous());
        assert!(!registry.get("chat").unwrap().is_asynchronous());
        assert_eq!(registry.task_types(), vec!["bigquery", "chat"]);
    }

    #[test]
    fn test_register_replaces_same_type() {
        let mut registry = AgentRegistry::new();
        registry.register_async(MockAgent {
            task_type: "chat".to_string(),
        });
        registry.register_sync(MockSyncAgent);

        assert_eq!(registry.len(), 1);
        assert!(!registry.get("chat").unwrap().is_asynchronous());
    }

    #[tokio::test]
    async fn test_sync_agent_runs_on_blocking_pool() {
        let agent = Agent::from_sync(MockSyncAgent);
        let ctx = AgentContext::new("t");
        let template = TaskTemplate::new("t", "chat");

        let response = agent
            .create(&ctx, "/tmp/prefix", &template, &LiteralMap::new())
            .await
            .unwrap();
        assert_eq!(response.terminal().unwrap().state, State::Succeeded);
    }
}
