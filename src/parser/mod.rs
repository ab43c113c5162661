// ABOUTME: Parser module for YAML plan files
// ABOUTME: Exports plan parsing, validation and conversion into an orchestrator

pub mod error;
pub mod plan;

pub use error::{ParserError, Result, ValidationError};
pub use plan::{Plan, TaskSpec};
