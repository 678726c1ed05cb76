//! Agent error types

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{LogLink, State};

/// Errors reported by a backend or the staging store
#[derive(Debug, Error)]
pub enum AgentError {
    /// Backend refused the request (bad request, quota, auth)
    #[error("{0}")]
    Rejected(String),

    /// Backend call failed in transport or on the backend side
    #[error("Backend call failed: {0}")]
    Rpc(String),

    /// Unit of work unknown to the backend
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Staging store IO error
    #[error("Staging IO error at {path}: {source}")]
    Blob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker running a synchronous backend call died
    #[error("Backend worker failed: {0}")]
    Worker(String),
}

impl AgentError {
    pub(crate) fn blob(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Blob {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Failure of one task execution, as reported to the caller
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No backend registered for the task type
    #[error("No agent registered for task type '{task_type}' (task {task})")]
    NoAgent { task: String, task_type: String },

    /// Inputs could not be converted
    #[error("Failed to convert inputs of task {task}: {source}")]
    Conversion {
        task: String,
        #[source]
        source: kiln_core::ConversionError,
    },

    /// Inputs could not be staged
    #[error("Failed to stage inputs of task {task}: {source}")]
    Staging {
        task: String,
        #[source]
        source: AgentError,
    },

    /// Backend refused `create`
    #[error("Backend rejected task {task}: {message}")]
    BackendRejected { task: String, message: String },

    /// Backend call failed while polling
    #[error("Backend error while running task {task}: {source}")]
    Backend {
        task: String,
        #[source]
        source: AgentError,
    },

    /// Terminal state was not success
    #[error("Failed to run the task {task}: {state} {message}{}", format_links(.log_links))]
    RemoteExecutionFailed {
        task: String,
        state: State,
        message: String,
        log_links: Vec<LogLink>,
    },

    /// Success reported but no outputs could be found
    #[error("Outputs of task {task} are unavailable: {reason}")]
    ResultUnavailable { task: String, reason: String },

    /// Execution interrupted; remote cleanup has run
    #[error("Execution of task {task} was cancelled")]
    Cancelled { task: String },
}

impl ExecutionError {
    /// Name of the task this error belongs to
    pub fn task(&self) -> &str {
        match self {
            Self::NoAgent { task, .. }
            | Self::Conversion { task, .. }
            | Self::Staging { task, .. }
            | Self::BackendRejected { task, .. }
            | Self::Backend { task, .. }
            | Self::RemoteExecutionFailed { task, .. }
            | Self::ResultUnavailable { task, .. }
            | Self::Cancelled { task } => task,
        }
    }

    /// Whether the execution ended because of an interrupt
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn format_links(links: &[LogLink]) -> String {
    links.iter().map(|l| format!("\n  {}", l)).collect()
}
