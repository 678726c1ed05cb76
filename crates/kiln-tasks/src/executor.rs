//! Task executor: cache lookup, local or remote run, cache store

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use kiln_agents::{
    AgentRegistry, ControllerOptions, ExecutionError, LifecycleController, LocalBlobStore,
    ProgressReporter, ReporterRegistry,
};
use kiln_core::{Config, ConversionError, JsonConverter, LiteralMap, ValueConverter};

use crate::cache::{CacheEntry, CacheError, TaskCache};
use crate::fingerprint::{fingerprint, CacheKey};
use crate::task::TaskSpec;

/// Where a task's outputs came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Cache,
    Local,
    Remote,
}

/// Result of one task execution
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub outputs: LiteralMap,
    pub source: OutputSource,
    /// Set when the task was cacheable and a cache is configured
    pub key: Option<CacheKey>,
}

impl TaskOutcome {
    pub fn from_cache(&self) -> bool {
        self.source == OutputSource::Cache
    }
}

/// Task execution errors
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Failed to convert values of task {task}: {source}")]
    Conversion {
        task: String,
        #[source]
        source: ConversionError,
    },

    #[error("Task {task} has no local implementation")]
    NoLocalImplementation { task: String },

    #[error("Task {task} failed: {source}")]
    Local {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Local run of task {task} panicked")]
    Panicked { task: String },
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Execution(e) if e.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Runs tasks with optional memoization
pub struct TaskExecutor {
    controller: Arc<LifecycleController>,
    cache: Option<TaskCache>,
    converter: Arc<dyn ValueConverter>,
}

impl TaskExecutor {
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            controller: Arc::new(controller),
            cache: None,
            converter: Arc::new(JsonConverter),
        }
    }

    /// Wire registry, staging store, reporters and cache from config
    pub fn from_config(config: &Config, registry: AgentRegistry) -> Self {
        let blobs = LocalBlobStore::new(
            config.staging.resolved_root(),
            config.staging.resolved_scratch(),
        );

        let mut reporters = ReporterRegistry::new();
        if config.agent.show_progress {
            reporters.register(ProgressReporter::new());
        }

        let controller = LifecycleController::new(Arc::new(registry), Arc::new(blobs))
            .with_reporter(Arc::new(reporters))
            .with_options(ControllerOptions::from_config(&config.agent));

        let executor = Self::new(controller);
        match TaskCache::from_config(&config.cache) {
            Some(cache) => executor.with_cache(cache),
            None => executor,
        }
    }

    pub fn with_cache(mut self, cache: TaskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn cache(&self) -> Option<&TaskCache> {
        self.cache.as_ref()
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Convert native inputs and execute
    pub async fn execute(
        &self,
        spec: &TaskSpec,
        inputs: &BTreeMap<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        let literals = self
            .converter
            .to_literal_map(inputs, &spec.template().interface.inputs)
            .map_err(|source| TaskError::Conversion {
                task: spec.name().to_string(),
                source,
            })?;
        self.execute_literals(spec, &literals, cancel).await
    }

    /// Execute with literal inputs, consulting the cache first
    #[instrument(skip_all, fields(task = %spec.name(), remote = spec.remote))]
    pub async fn execute_literals(
        &self,
        spec: &TaskSpec,
        inputs: &LiteralMap,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        let cached = match (&self.cache, spec.cacheable) {
            (Some(cache), true) => {
                let key = fingerprint(spec.name(), spec.cache_version(), inputs);
                Some((cache, key))
            }
            _ => None,
        };

        if let Some((cache, key)) = &cached {
            match lookup(cache, key).await {
                Ok(Some(entry)) => {
                    info!(key = %key, "using cached result");
                    return Ok(TaskOutcome {
                        outputs: entry.outputs,
                        source: OutputSource::Cache,
                        key: Some(key.clone()),
                    });
                }
                Ok(None) => debug!(key = %key, "no cached result"),
                Err(e) => warn!(error = %e, "cache unavailable, recomputing"),
            }
        }

        let (outputs, source) = if spec.remote {
            let outputs = self
                .controller
                .execute_literals(&spec.description, inputs, cancel)
                .await?;
            (outputs, OutputSource::Remote)
        } else {
            (self.run_local(spec, inputs).await?, OutputSource::Local)
        };

        if let Some((cache, key)) = &cached {
            if let Err(e) = store(cache, key, &outputs).await {
                warn!(error = %e, "failed to store result in cache");
            }
        }

        Ok(TaskOutcome {
            outputs,
            source,
            key: cached.map(|(_, key)| key),
        })
    }

    async fn run_local(&self, spec: &TaskSpec, inputs: &LiteralMap) -> Result<LiteralMap> {
        let task = spec.name().to_string();
        let f = spec
            .local
            .clone()
            .ok_or_else(|| TaskError::NoLocalImplementation { task: task.clone() })?;

        let inputs = inputs.clone();
        match tokio::task::spawn_blocking(move || f(&inputs)).await {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(source)) => Err(TaskError::Local { task, source }),
            Err(_) => Err(TaskError::Panicked { task }),
        }
    }

    /// Convert outputs back to native values using the task interface
    pub fn outputs_to_native(
        &self,
        spec: &TaskSpec,
        outcome: &TaskOutcome,
    ) -> Result<BTreeMap<String, Value>> {
        self.converter
            .to_native_map(&outcome.outputs, &spec.template().interface.outputs)
            .map_err(|source| TaskError::Conversion {
                task: spec.name().to_string(),
                source,
            })
    }
}

/// Cache reads and writes run on the blocking pool
async fn lookup(
    cache: &TaskCache,
    key: &CacheKey,
) -> std::result::Result<Option<CacheEntry>, CacheError> {
    let (cache, key) = (cache.clone(), key.clone());
    tokio::task::spawn_blocking(move || cache.get(&key))
        .await
        .map_err(|e| CacheError::Interrupted(e.to_string()))?
}

async fn store(
    cache: &TaskCache,
    key: &CacheKey,
    outputs: &LiteralMap,
) -> std::result::Result<bool, CacheError> {
    let (cache, key, outputs) = (cache.clone(), key.clone(), outputs.clone());
    tokio::task::spawn_blocking(move || cache.put(&key, &outputs))
        .await
        .map_err(|e| CacheError::Interrupted(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_agents::testing::ScriptedAgent;
    use kiln_agents::{CollectingReporter, TaskDescription};
    use kiln_core::{LiteralType, TaskTemplate, TypedInterface};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn add_numbers_template() -> TaskTemplate {
        TaskTemplate::new("add_numbers", "adder")
            .with_cache_version("1")
            .with_interface(
                TypedInterface::new()
                    .with_input("x", LiteralType::Integer)
                    .with_input("y", LiteralType::Integer)
                    .with_output("o0", LiteralType::Integer),
            )
    }

    fn inputs(x: i64, y: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("x".to_string(), json!(x)), ("y".to_string(), json!(y))])
    }

    fn executor(temp: &TempDir, registry: AgentRegistry) -> TaskExecutor {
        let blobs = LocalBlobStore::new(temp.path().join("remote"), temp.path().join("scratch"));
        let controller = LifecycleController::new(Arc::new(registry), Arc::new(blobs))
            .with_reporter(Arc::new(CollectingReporter::default()));
        TaskExecutor::new(controller).with_cache(TaskCache::new(temp.path().join("cache")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_numbers_second_call_hits_cache() {
        let temp = TempDir::new().unwrap();
        let agent = ScriptedAgent::new("adder")
            .running_for(1)
            .succeeding_with(LiteralMap::new().with("o0", 7i64));
        let calls = agent.calls();
        let mut registry = AgentRegistry::new();
        registry.register_async(agent);
        let executor = executor(&temp, registry);

        let spec = TaskSpec::remote(TaskDescription::new(add_numbers_template()));
        let cancel = CancellationToken::new();

        let first = executor.execute(&spec, &inputs(3, 4), &cancel).await.unwrap();
        assert_eq!(first.source, OutputSource::Remote);
        assert_eq!(first.outputs.get("o0").and_then(|l| l.as_integer()), Some(7));
        assert!(first.key.as_ref().unwrap().as_str().starts_with("add_numbers-1-"));

        let second = executor.execute(&spec, &inputs(3, 4), &cancel).await.unwrap();
        assert!(second.from_cache());
        assert_eq!(second.outputs, first.outputs);
        assert_eq!(second.key, first.key);
        assert_eq!(calls.creates(), 1);

        let native = executor.outputs_to_native(&spec, &second).unwrap();
        assert_eq!(native.get("o0"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_local_task_is_memoized() {
        let temp = TempDir::new().unwrap();
        let executor = executor(&temp, AgentRegistry::new());

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let spec = TaskSpec::local(add_numbers_template(), move |inputs| {
            counter.fetch_add(1, Ordering::SeqCst);
            let x = inputs.get("x").and_then(|l| l.as_integer()).unwrap_or(0);
            let y = inputs.get("y").and_then(|l| l.as_integer()).unwrap_or(0);
            Ok(LiteralMap::new().with("o0", x + y))
        });
        let cancel = CancellationToken::new();

        let first = executor.execute(&spec, &inputs(3, 4), &cancel).await.unwrap();
        assert_eq!(first.source, OutputSource::Local);
        let second = executor.execute(&spec, &inputs(3, 4), &cancel).await.unwrap();
        assert!(second.from_cache());
        let other = executor.execute(&spec, &inputs(5, 4), &cancel).await.unwrap();
        assert_eq!(other.outputs.get("o0").and_then(|l| l.as_integer()), Some(9));

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncacheable_task_always_runs() {
        let temp = TempDir::new().unwrap();
        let executor = executor(&temp, AgentRegistry::new());

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let spec = TaskSpec::local(add_numbers_template(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(LiteralMap::new().with("o0", 0i64))
        })
        .with_cacheable(false);

        let cancel = CancellationToken::new();
        let outcome = executor.execute(&spec, &inputs(1, 1), &cancel).await.unwrap();
        executor.execute(&spec, &inputs(1, 1), &cancel).await.unwrap();

        assert!(outcome.key.is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_recomputes() {
        let temp = TempDir::new().unwrap();
        let blocked = temp.path().join("blocked");
        std::fs::write(&blocked, "not a directory").unwrap();

        let blobs = LocalBlobStore::new(temp.path().join("remote"), temp.path().join("scratch"));
        let controller = LifecycleController::new(Arc::new(AgentRegistry::new()), Arc::new(blobs));
        let executor = TaskExecutor::new(controller).with_cache(TaskCache::new(&blocked));

        let spec = TaskSpec::local(add_numbers_template(), |_| {
            Ok(LiteralMap::new().with("o0", 7i64))
        });
        let outcome = executor
            .execute(&spec, &inputs(3, 4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.source, OutputSource::Local);
    }

    #[tokio::test]
    async fn test_local_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let executor = executor(&temp, AgentRegistry::new());
        let spec = TaskSpec::local(add_numbers_template(), |_| anyhow::bail!("division by zero"));

        let err = executor
            .execute(&spec, &inputs(1, 0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task add_numbers failed: division by zero");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_from_config_respects_cache_switch() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().join("cache"));
        config.staging.root = Some(temp.path().join("remote"));
        config.agent.show_progress = false;

        let enabled = TaskExecutor::from_config(&config, AgentRegistry::new());
        assert_eq!(enabled.cache().unwrap().cache_dir(), temp.path().join("cache"));

        config.cache.enabled = false;
        let disabled = TaskExecutor::from_config(&config, AgentRegistry::new());
        assert!(disabled.cache().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_remote_run_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let agent = ScriptedAgent::new("adder").failing_with("boom");
        let mut registry = AgentRegistry::new();
        registry.register_async(agent);
        let executor = executor(&temp, registry);

        let spec = TaskSpec::remote(TaskDescription::new(add_numbers_template()));
        let err = executor
            .execute(&spec, &inputs(3, 4), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskError::Execution(ExecutionError::RemoteExecutionFailed { .. })
        ));
        assert_eq!(executor.cache().unwrap().status().unwrap().entries, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cache_io_on_single_threaded_runtime() {
        let temp = TempDir::new().unwrap();
        let cache = TaskCache::new(temp.path().join("cache"));
        let key = fingerprint("add_numbers", "1", &LiteralMap::new().with("x", 3i64));
        let outputs = LiteralMap::new().with("o0", 7i64);

        assert_eq!(lookup(&cache, &key).await.unwrap(), None);
        let (first, second) = tokio::join!(
            store(&cache, &key, &outputs),
            store(&cache, &key, &outputs)
        );
        assert_eq!(
            [first.unwrap(), second.unwrap()].iter().filter(|p| **p).count(),
            1
        );
        assert_eq!(lookup(&cache, &key).await.unwrap().unwrap().outputs, outputs);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_executions_share_one_entry() {
        let temp = TempDir::new().unwrap();
        let executor = executor(&temp, AgentRegistry::new());
        let spec = TaskSpec::local(add_numbers_template(), |_| {
            Ok(LiteralMap::new().with("o0", 7i64))
        });
        let cancel = CancellationToken::new();

        let inputs_a = inputs(3, 4);
        let inputs_b = inputs(3, 4);
        let (a, b) = tokio::join!(
            executor.execute(&spec, &inputs_a, &cancel),
            executor.execute(&spec, &inputs_b, &cancel)
        );
        assert_eq!(a.unwrap().outputs, b.unwrap().outputs);
        assert_eq!(executor.cache().unwrap().status().unwrap().entries, 1);
    }
}
