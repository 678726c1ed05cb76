//! Task template and interface types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::literals::BlobDimensionality;

/// Declared type of a task input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    None,
    Integer,
    Float,
    String,
    Boolean,
    Datetime,
    Duration,
    Binary,
    Blob {
        #[serde(default)]
        format: String,
        #[serde(default)]
        dimensionality: BlobDimensionality,
    },
    Struct,
    Collection(Box<LiteralType>),
    Map(Box<LiteralType>),
}

impl LiteralType {
    /// Collection of `inner`
    pub fn collection_of(inner: LiteralType) -> Self {
        Self::Collection(Box::new(inner))
    }

    /// String-keyed map of `inner`
    pub fn map_of(inner: LiteralType) -> Self {
        Self::Map(Box::new(inner))
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralType::None => write!(f, "none"),
            LiteralType::Integer => write!(f, "integer"),
            LiteralType::Float => write!(f, "float"),
            LiteralType::String => write!(f, "string"),
            LiteralType::Boolean => write!(f, "boolean"),
            LiteralType::Datetime => write!(f, "datetime"),
            LiteralType::Duration => write!(f, "duration"),
            LiteralType::Binary => write!(f, "binary"),
            LiteralType::Blob { format, .. } if format.is_empty() => write!(f, "blob"),
            LiteralType::Blob { format, .. } => write!(f, "blob[{}]", format),
            LiteralType::Struct => write!(f, "struct"),
            LiteralType::Collection(inner) => write!(f, "list<{}>", inner),
            LiteralType::Map(inner) => write!(f, "map<{}>", inner),
        }
    }
}

/// A named input or output slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(rename = "type")]
    pub literal_type: LiteralType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(literal_type: LiteralType) -> Self {
        Self {
            literal_type,
            description: None,
        }
    }
}

/// Inputs and outputs a task declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedInterface {
    #[serde(default)]
    pub inputs: BTreeMap<String, Variable>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Variable>,
}

impl TypedInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input
    pub fn with_input(mut self, name: impl Into<String>, literal_type: LiteralType) -> Self {
        self.inputs.insert(name.into(), Variable::new(literal_type));
        self
    }

    /// Declare an output
    pub fn with_output(mut self, name: impl Into<String>, literal_type: LiteralType) -> Self {
        self.outputs.insert(name.into(), Variable::new(literal_type));
        self
    }
}

/// Identity of a task definition
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdentifier {
    /// Fully qualified task name
    pub name: String,
    /// Definition version
    #[serde(default)]
    pub version: String,
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// Container the task runs in, for backends that launch one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Execution metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Whether results may be reused from the cache
    #[serde(default)]
    pub discoverable: bool,
    /// Bump to invalidate previously cached results
    #[serde(default)]
    pub cache_version: String,
}

/// Serializable description of a task handed to an execution backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TaskIdentifier,

    /// Tag used to look up the backend that runs this task
    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub interface: TypedInterface,

    #[serde(default)]
    pub metadata: TaskMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    /// Backend-specific configuration
    #[serde(default)]
    pub custom: serde_json::Value,
}

impl TaskTemplate {
    /// Create a new template
    pub fn new(name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: TaskIdentifier {
                name: name.into(),
                version: String::new(),
            },
            task_type: task_type.into(),
            interface: TypedInterface::default(),
            metadata: TaskMetadata::default(),
            container: None,
            custom: serde_json::Value::Null,
        }
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn with_interface(mut self, interface: TypedInterface) -> Self {
        self.interface = interface;
        self
    }

    /// Mark the task cacheable under the given cache version
    pub fn with_cache_version(mut self, version: impl Into<String>) -> Self {
        self.metadata.discoverable = true;
        self.metadata.cache_version = version.into();
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_custom(mut self, custom: serde_json::Value) -> Self {
        self.custom = custom;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_type_display() {
        assert_eq!(LiteralType::Integer.to_string(), "integer");
        assert_eq!(
            LiteralType::collection_of(LiteralType::map_of(LiteralType::Float)).to_string(),
            "list<map<float>>"
        );
        let csv = LiteralType::Blob {
            format: "csv".to_string(),
            dimensionality: BlobDimensionality::Single,
        };
        assert_eq!(csv.to_string(), "blob[csv]");
    }

    #[test]
    fn test_template_builder() {
        let template = TaskTemplate::new("math.add_numbers", "python-task")
            .with_interface(
                TypedInterface::new()
                    .with_input("x", LiteralType::Integer)
                    .with_input("y", LiteralType::Integer)
                    .with_output("o0", LiteralType::Integer),
            )
            .with_cache_version("1");

        assert_eq!(template.name(), "math.add_numbers");
        assert_eq!(template.interface.inputs.len(), 2);
        assert!(template.metadata.discoverable);
        assert_eq!(template.metadata.cache_version, "1");
    }

    #[test]
    fn test_template_yaml() {
        let yaml = r#"
id:
  name: etl.load
type: bigquery
interface:
  inputs:
    day:
      type: datetime
  outputs:
    rows:
      type:
        collection: struct
custom:
  query: "select 1"
"#;
        let template: TaskTemplate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.task_type, "bigquery");
        assert_eq!(
            template.interface.outputs["rows"].literal_type,
            LiteralType::collection_of(LiteralType::Struct)
        );
        assert_eq!(template.custom["query"], "select 1");
        assert!(template.container.is_none());
    }

    #[test]
    fn test_identifier_display() {
        let id = TaskIdentifier {
            name: "wf.t1".to_string(),
            version: "v3".to_string(),
        };
        assert_eq!(id.to_string(), "wf.t1@v3");
    }
}
