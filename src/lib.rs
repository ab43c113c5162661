// ABOUTME: Main library module for the conductor task orchestration engine
// ABOUTME: Exports the engine, plan parser, built-in tasks and CLI driver

pub mod cli;
pub mod engine;
pub mod parser;
pub mod tasks;

pub use engine::{
    EngineConfig, ExecutionContext, ExecutionError, Orchestrator, RetryDelay, RunResults,
    TaskBody, TaskDescriptor, TaskResult, TaskStatus,
};
pub use parser::Plan;
pub use tasks::{TaskRegistry, Workspace};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
