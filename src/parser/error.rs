// ABOUTME: Error types for plan parsing and validation
// ABOUTME: Wraps IO, YAML and engine errors raised while turning a plan into an orchestrator

use thiserror::Error;

use crate::engine::ExecutionError;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read plan file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to build task: {0}")]
    BuildError(#[from] ExecutionError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty plan: no tasks defined")]
    EmptyPlan,

    #[error("Task '{task}' has an empty dependency id")]
    EmptyDependency { task: String },

    #[error("Task '{task}' depends on itself")]
    SelfDependency { task: String },

    #[error("Unsupported task type '{task_type}' in task '{task}'. Supported types: {supported_types:?}")]
    UnsupportedTaskType {
        task: String,
        task_type: String,
        supported_types: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, ParserError>;
