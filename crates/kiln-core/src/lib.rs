//! Kiln Core - shared types for task execution
//!
//! This crate provides the structured value model exchanged between tasks,
//! task template and interface types, value conversion, configuration and
//! the error types shared by the other Kiln crates.

pub mod config;
pub mod convert;
pub mod error;
pub mod literals;
pub mod types;

pub use config::{load_config, load_config_or_default, Config};
pub use convert::{JsonConverter, ValueConverter};
pub use error::{ConfigError, ConversionError, CoreError, Result};
pub use literals::{Binary, Blob, BlobDimensionality, Literal, LiteralMap, LiteralValue, Scalar};
pub use types::{
    Container, LiteralType, TaskIdentifier, TaskMetadata, TaskTemplate, TypedInterface, Variable,
};
