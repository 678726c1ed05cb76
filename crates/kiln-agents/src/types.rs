//! Agent wire types

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use kiln_core::LiteralMap;

/// State of a remote unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Unspecified,
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl State {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed | State::Aborted)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Unspecified => write!(f, "UNSPECIFIED"),
            State::Pending => write!(f, "PENDING"),
            State::Queued => write!(f, "QUEUED"),
            State::Running => write!(f, "RUNNING"),
            State::Succeeded => write!(f, "SUCCEEDED"),
            State::Failed => write!(f, "FAILED"),
            State::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Opaque handle a backend returns from `create`
///
/// The controller never looks inside; it only hands the bytes back to the
/// same backend for `get` and `delete`.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMeta(Vec<u8>);

impl ResourceMeta {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Encode backend metadata as JSON bytes
    pub fn encode<T: Serialize>(meta: &T) -> serde_json::Result<Self> {
        serde_json::to_vec(meta).map(Self)
    }

    /// Decode JSON bytes produced by [`ResourceMeta::encode`]
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ResourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceMeta({} bytes)", self.0.len())
    }
}

/// Link to backend-side logs or consoles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLink {
    pub name: String,
    pub uri: String,
}

impl LogLink {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

impl fmt::Display for LogLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.uri)
    }
}

/// Backend view of a unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub state: State,

    /// Inline outputs; some backends only write them to the staging area
    #[serde(default)]
    pub outputs: Option<LiteralMap>,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub log_links: Vec<LogLink>,
}

impl Resource {
    pub fn new(state: State) -> Self {
        Self {
            state,
            outputs: None,
            message: String::new(),
            log_links: Vec::new(),
        }
    }

    pub fn with_outputs(mut self, outputs: LiteralMap) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_log_link(mut self, link: LogLink) -> Self {
        self.log_links.push(link);
        self
    }
}

/// Reply to `create`
///
/// Asynchronous backends return only a handle. Synchronous backends may
/// also return the finished resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTaskResponse {
    pub resource_meta: ResourceMeta,
    pub resource: Option<Resource>,
}

impl CreateTaskResponse {
    /// Work accepted, poll for completion
    pub fn pending(resource_meta: ResourceMeta) -> Self {
        Self {
            resource_meta,
            resource: None,
        }
    }

    /// Work already finished at create time
    pub fn completed(resource_meta: ResourceMeta, resource: Resource) -> Self {
        Self {
            resource_meta,
            resource: Some(resource),
        }
    }

    /// The finished resource, if create already reached a terminal state
    pub fn terminal(&self) -> Option<&Resource> {
        self.resource.as_ref().filter(|r| r.state.is_terminal())
    }
}

/// Per-execution context handed to every backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
    /// Unique id of this execution
    pub execution_id: String,
    /// Name of the task being executed
    pub task_name: String,
}

impl AgentContext {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().simple().to_string(),
            task_name: task_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(State::Succeeded.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(State::Aborted.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(!State::Queued.is_terminal());
        assert!(!State::Unspecified.is_terminal());
    }

    #[test]
    fn test_resource_meta_encode_decode() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct JobRef {
            job_id: String,
        }

        let meta = ResourceMeta::encode(&JobRef {
            job_id: "j-42".to_string(),
        })
        .unwrap();
        let back: JobRef = meta.decode().unwrap();
        assert_eq!(back.job_id, "j-42");
        assert_eq!(format!("{:?}", meta), format!("ResourceMeta({} bytes)", meta.as_bytes().len()));
    }

    #[test]
    fn test_create_response_terminal() {
        let meta = ResourceMeta::new(b"id".to_vec());
        assert!(CreateTaskResponse::pending(meta.clone()).terminal().is_none());

        let running = CreateTaskResponse::completed(meta.clone(), Resource::new(State::Running));
        assert!(running.terminal().is_none());

        let done = CreateTaskResponse::completed(meta, Resource::new(State::Succeeded));
        assert_eq!(done.terminal().unwrap().state, State::Succeeded);
    }

    #[test]
    fn test_state_serde() {
        assert_eq!(serde_json::to_string(&State::Running).unwrap(), "\"RUNNING\"");
        assert_eq!(State::Failed.to_string(), "FAILED");
    }
}
