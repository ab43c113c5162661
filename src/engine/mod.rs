// ABOUTME: Task orchestration engine module
// ABOUTME: Dependency ordering, timed and retried task execution, and run results

pub mod context;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod result;
pub mod scheduler;
pub mod summary;
pub mod task;

pub use context::{ExecutionContext, RunLogger, UnmetDependency};
pub use dependency::{DependencyGraph, ExecutionPlan};
pub use error::{ExecutionError, Result};
pub use executor::Orchestrator;
pub use result::{RunResults, RunSummary, TaskResult, TaskStatus};
pub use scheduler::{EngineConfig, RetryDelay, TaskScheduler};
pub use summary::render_summary;
pub use task::{FnTask, TaskBody, TaskDescriptor};
