// ABOUTME: Task descriptors and the opaque task body abstraction
// ABOUTME: Describes what the engine schedules without knowing what a task does

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::context::ExecutionContext;
use super::scheduler::RetryDelay;

/// The work a task performs. The engine only decides when and how many times it runs.
///
/// Bodies receive their own clone of the run's [`ExecutionContext`] and are spawned
/// onto the runtime, so an attempt that times out keeps running in the background
/// unless the body watches [`ExecutionContext::cancellation`].
#[async_trait]
pub trait TaskBody<R>: Send + Sync {
    async fn run(&self, context: ExecutionContext<R>) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`TaskBody`]
pub struct FnTask<F> {
    func: F,
}

impl<F> FnTask<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<R, F, Fut> TaskBody<R> for FnTask<F>
where
    R: Send + Sync + 'static,
    F: Fn(ExecutionContext<R>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, context: ExecutionContext<R>) -> anyhow::Result<Value> {
        (self.func)(context).await
    }
}

pub struct TaskDescriptor<R> {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    /// Per-attempt bound; the engine default applies when unset
    pub timeout: Option<Duration>,
    /// Additional attempts allowed after the first failure
    pub retries: u32,
    pub critical: bool,
    pub retry_delay: Option<RetryDelay>,
    pub body: Arc<dyn TaskBody<R>>,
}

impl<R> TaskDescriptor<R>
where
    R: Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, body: impl TaskBody<R> + 'static) -> Self {
        Self::from_shared(id, Arc::new(body))
    }

    pub fn from_shared(id: impl Into<String>, body: Arc<dyn TaskBody<R>>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            dependencies: Vec::new(),
            timeout: None,
            retries: 0,
            critical: false,
            retry_delay: None,
            body,
        }
    }

    pub fn from_fn<F, Fut>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(ExecutionContext<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(id, FnTask::new(func))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a prerequisite; repeated ids are ignored
    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if !self.dependencies.contains(&task_id) {
            self.dependencies.push(task_id);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        task_ids
            .into_iter()
            .fold(self, |descriptor, id| descriptor.depends_on(id))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: RetryDelay) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl<R> Clone for TaskDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
            timeout: self.timeout,
            retries: self.retries,
            critical: self.critical,
            retry_delay: self.retry_delay.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<R> std::fmt::Debug for TaskDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("critical", &self.critical)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}
