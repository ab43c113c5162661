// ABOUTME: Orchestrator that owns task registrations and drives sequential runs
// ABOUTME: Applies dependency checks, the retrying scheduler and the critical-task abort policy

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::context::ExecutionContext;
use super::dependency::{DependencyGraph, ExecutionPlan};
use super::error::{ExecutionError, Result};
use super::result::{RunResults, TaskResult};
use super::scheduler::{EngineConfig, TaskScheduler};
use super::summary::render_summary;
use super::task::TaskDescriptor;

/// Registers tasks and runs them in dependency order.
///
/// `R` is the caller's resource handle (a browser session, an HTTP client,
/// a working directory). It is passed through to every task body untouched.
/// Runs take `&mut self`, so one orchestrator never has two runs in flight.
pub struct Orchestrator<R> {
    name: String,
    tasks: IndexMap<String, TaskDescriptor<R>>,
    results: RunResults,
    scheduler: TaskScheduler,
}

impl<R> Orchestrator<R>
where
    R: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, EngineConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            name: name.into(),
            tasks: IndexMap::new(),
            results: RunResults::new(),
            scheduler: TaskScheduler::new(config),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        self.scheduler.config()
    }

    /// Register a task. Re-registering an id replaces the earlier descriptor
    /// and keeps its original position.
    pub fn register(&mut self, descriptor: TaskDescriptor<R>) {
        let task_id = descriptor.id.clone();
        if self.tasks.insert(task_id.clone(), descriptor).is_some() {
            debug!("Replaced task registration: {}", task_id);
        } else {
            debug!("Registered task: {}", task_id);
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskDescriptor<R>> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskDescriptor<R>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_descriptors(&self.tasks)
    }

    /// Compute the execution order without running anything
    pub fn execution_plan(&self) -> Result<ExecutionPlan> {
        self.dependency_graph().create_execution_plan()
    }

    pub fn execution_order(&self) -> Result<Vec<String>> {
        Ok(self.execution_plan()?.order)
    }

    /// Run every registered task in dependency order.
    ///
    /// Returns the complete result set, or `CriticalTaskFailed` when a critical
    /// task fails; in that case the results recorded so far stay available
    /// through [`Orchestrator::get_all_results`]. Structural graph errors are
    /// returned before any task body runs and leave the result set empty.
    #[instrument(skip(self, resource, config), fields(orchestrator = %self.name))]
    pub async fn run_all(&mut self, resource: Arc<R>, config: Value) -> Result<RunResults> {
        let start_time = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        self.results.clear();

        info!(
            "Starting run: {} (run_id: {}, {} tasks)",
            self.name,
            run_id,
            self.tasks.len()
        );

        let graph = self.dependency_graph();
        let plan = graph.create_execution_plan().map_err(|e| {
            error!("Cannot build execution order: {}", e);
            e
        })?;
        debug!("Execution order: {:?}", plan.order);

        let context = ExecutionContext::new(self.name.clone(), run_id, resource, config);

        for task_id in &plan.order {
            let task = self
                .tasks
                .get(task_id)
                .ok_or_else(|| ExecutionError::TaskNotFound {
                    task_id: task_id.clone(),
                })?;

            let result = match context.unmet_dependency(&task.dependencies).await {
                Some(unmet) => {
                    warn!("Task {} blocked: {}", task_id, unmet);
                    TaskResult::blocked(task_id.clone(), unmet.to_string())
                }
                None => {
                    self.scheduler
                        .execute_task_with_retry(task, &context)
                        .await
                }
            };

            let failure = result
                .is_failed()
                .then(|| result.error.clone().unwrap_or_else(|| result.status.to_string()));
            context.record_result(result).await;

            let Some(message) = failure else {
                info!("Task {} completed successfully", task_id);
                continue;
            };

            let downstream = graph.get_transitive_dependents(task_id);
            if !downstream.is_empty() {
                debug!("Failure of {} blocks downstream tasks: {:?}", task_id, downstream);
            }

            if task.critical {
                error!(
                    "Critical task {} failed, aborting run: {}",
                    task_id, message
                );
                self.results = context.results().await;
                return Err(ExecutionError::CriticalTaskFailed {
                    task_id: task_id.clone(),
                    message,
                });
            }

            warn!("Task {} failed, continuing: {}", task_id, message);
        }

        self.results = context.results().await;

        let summary = self.results.summary();
        info!(
            "Run {} completed in {:?}: {} succeeded, {} failed",
            self.name,
            start_time.elapsed(),
            summary.successful_tasks,
            summary.failed_tasks
        );

        Ok(self.results.clone())
    }

    pub fn get_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    /// Copy of the latest run's results
    pub fn get_all_results(&self) -> RunResults {
        self.results.clone()
    }

    pub fn render_summary(&self) -> String {
        render_summary(&self.name, &self.results)
    }
}

impl<R> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
