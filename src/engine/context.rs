// ABOUTME: Run-scoped execution context shared by every task body
// ABOUTME: Carries the resource handle, caller config, logger and read access to prior results

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::result::{RunResults, TaskResult};

pub struct ExecutionContext<R> {
    pub orchestrator: String,
    pub run_id: String,
    pub task_id: String,
    /// 1-based attempt number; 0 on the run-level context
    pub attempt: u32,
    pub start_time: DateTime<Utc>,
    resource: Arc<R>,
    config: Arc<Value>,
    results: Arc<RwLock<RunResults>>,
    logger: RunLogger,
    cancellation: CancellationToken,
}

/// A prerequisite that prevents a task from running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    pub task_id: String,
    pub missing: bool,
}

impl std::fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.missing {
            write!(f, "dependency '{}' has no result", self.task_id)
        } else {
            write!(f, "dependency '{}' did not succeed", self.task_id)
        }
    }
}

impl<R> ExecutionContext<R> {
    pub fn new(orchestrator: String, run_id: String, resource: Arc<R>, config: Value) -> Self {
        let logger = RunLogger::new(orchestrator.clone(), run_id.clone());

        Self {
            orchestrator,
            run_id,
            task_id: String::new(),
            attempt: 0,
            start_time: Utc::now(),
            resource,
            config: Arc::new(config),
            results: Arc::new(RwLock::new(RunResults::new())),
            logger,
            cancellation: CancellationToken::new(),
        }
    }

    /// Context handed to one attempt of one task. Shares the result set and
    /// resource; gets a fresh child cancellation token.
    pub fn for_task(&self, task_id: &str, attempt: u32) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            run_id: self.run_id.clone(),
            task_id: task_id.to_string(),
            attempt,
            start_time: Utc::now(),
            resource: Arc::clone(&self.resource),
            config: Arc::clone(&self.config),
            results: Arc::clone(&self.results),
            logger: self.logger.for_task(task_id),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Look up a top-level key of an object config
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn logger(&self) -> &RunLogger {
        &self.logger
    }

    /// Fired on timeout when the engine is configured to cancel timed-out attempts
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub async fn get_result(&self, task_id: &str) -> Option<TaskResult> {
        let results = self.results.read().await;
        results.get(task_id).cloned()
    }

    /// Payload produced by an earlier successful task
    pub async fn get_output(&self, task_id: &str) -> Option<Value> {
        self.get_result(task_id)
            .await
            .filter(|r| r.is_successful())
            .and_then(|r| r.data)
    }

    pub async fn results(&self) -> RunResults {
        self.results.read().await.clone()
    }

    /// First dependency that is missing from the result set or did not succeed
    pub async fn unmet_dependency(&self, dependencies: &[String]) -> Option<UnmetDependency> {
        let results = self.results.read().await;

        dependencies
            .iter()
            .find_map(|dep_task_id| match results.get(dep_task_id) {
                Some(result) if result.is_successful() => None,
                Some(_) => Some(UnmetDependency {
                    task_id: dep_task_id.clone(),
                    missing: false,
                }),
                None => Some(UnmetDependency {
                    task_id: dep_task_id.clone(),
                    missing: true,
                }),
            })
    }

    pub(crate) async fn record_result(&self, result: TaskResult) {
        let mut results = self.results.write().await;
        results.insert(result);
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl<R> Clone for ExecutionContext<R> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            run_id: self.run_id.clone(),
            task_id: self.task_id.clone(),
            attempt: self.attempt,
            start_time: self.start_time,
            resource: Arc::clone(&self.resource),
            config: Arc::clone(&self.config),
            results: Arc::clone(&self.results),
            logger: self.logger.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<R> std::fmt::Debug for ExecutionContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("orchestrator", &self.orchestrator)
            .field("run_id", &self.run_id)
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

macro_rules! emit {
    ($level:ident, $logger:expr, $message:expr) => {{
        let logger: &RunLogger = $logger;
        let task_id = logger.task_id.as_deref().unwrap_or("-");
        tracing::$level!(
            orchestrator = %logger.orchestrator,
            run_id = %logger.run_id,
            task_id = task_id,
            "{}",
            $message
        )
    }};
}

/// Leveled logger for task bodies; every event carries the run and task ids
#[derive(Debug, Clone)]
pub struct RunLogger {
    orchestrator: String,
    run_id: String,
    task_id: Option<String>,
}

impl RunLogger {
    pub fn new(orchestrator: String, run_id: String) -> Self {
        Self {
            orchestrator,
            run_id,
            task_id: None,
        }
    }

    pub fn for_task(&self, task_id: &str) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            run_id: self.run_id.clone(),
            task_id: Some(task_id.to_string()),
        }
    }

    pub fn log(&self, level: tracing::Level, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            tracing::Level::TRACE => emit!(trace, self, message),
            tracing::Level::DEBUG => emit!(debug, self, message),
            tracing::Level::INFO => emit!(info, self, message),
            tracing::Level::WARN => emit!(warn, self, message),
            _ => emit!(error, self, message),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(tracing::Level::DEBUG, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(tracing::Level::INFO, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(tracing::Level::WARN, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(tracing::Level::ERROR, message);
    }
}
