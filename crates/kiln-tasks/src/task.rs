//! Task definitions

use std::fmt;
use std::sync::Arc;

use kiln_agents::TaskDescription;
use kiln_core::{LiteralMap, TaskTemplate};

/// In-process implementation of a task
pub type LocalFn = Arc<dyn Fn(&LiteralMap) -> anyhow::Result<LiteralMap> + Send + Sync>;

/// A task plus how the caller wants it run
#[derive(Clone)]
pub struct TaskSpec {
    pub description: TaskDescription,

    /// Results may be memoized by input fingerprint
    pub cacheable: bool,

    /// Run on the agent registered for the task type
    pub remote: bool,

    /// Used when `remote` is false
    pub local: Option<LocalFn>,
}

impl TaskSpec {
    /// Task executed by an agent; cacheable when the template is discoverable
    pub fn remote(description: TaskDescription) -> Self {
        let cacheable = description.template.metadata.discoverable;
        Self {
            description,
            cacheable,
            remote: true,
            local: None,
        }
    }

    /// Task executed in process
    pub fn local<F>(template: TaskTemplate, f: F) -> Self
    where
        F: Fn(&LiteralMap) -> anyhow::Result<LiteralMap> + Send + Sync + 'static,
    {
        let cacheable = template.metadata.discoverable;
        Self {
            description: TaskDescription::new(template),
            cacheable,
            remote: false,
            local: Some(Arc::new(f)),
        }
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn name(&self) -> &str {
        self.description.name()
    }

    pub fn template(&self) -> &TaskTemplate {
        &self.description.template
    }

    pub fn cache_version(&self) -> &str {
        &self.description.template.metadata.cache_version
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name())
            .field("cacheable", &self.cacheable)
            .field("remote", &self.remote)
            .field("local", &self.local.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheable_follows_template() {
        let plain = TaskSpec::remote(TaskDescription::new(TaskTemplate::new("q", "bigquery")));
        assert!(!plain.cacheable);
        assert!(plain.remote);

        let cached = TaskSpec::local(
            TaskTemplate::new("add", "python-task").with_cache_version("1"),
            |inputs| Ok(inputs.clone()),
        );
        assert!(cached.cacheable);
        assert!(!cached.remote);
        assert_eq!(cached.cache_version(), "1");
        assert!(!cached.with_cacheable(false).cacheable);
    }
}
