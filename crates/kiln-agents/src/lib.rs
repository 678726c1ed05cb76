//! Kiln Agents - remote task execution
//!
//! Backends ("agents") implement [`AsyncAgent`] or [`SyncAgent`] and are
//! registered by task type in an [`AgentRegistry`]. The
//! [`LifecycleController`] drives one task through create, poll, result
//! fetch and, when interrupted, delete.

pub mod blob;
pub mod controller;
pub mod error;
pub mod interrupt;
pub mod registry;
pub mod reporter;
pub mod template;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blob::{BlobStore, LocalBlobStore};
pub use controller::{ControllerOptions, LifecycleController, Phase, TaskDescription};
pub use error::{AgentError, ExecutionError, Result};
pub use interrupt::interrupt_token;
pub use registry::AgentRegistry;
pub use reporter::{
    CollectingReporter, LifecycleEvent, LifecycleReporter, ProgressReporter, ReporterRegistry,
    TracingReporter,
};
pub use traits::{Agent, AsyncAgent, SyncAgent};
pub use types::{AgentContext, CreateTaskResponse, LogLink, Resource, ResourceMeta, State};

pub use tokio_util::sync::CancellationToken;
