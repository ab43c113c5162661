// ABOUTME: Plan file structures and their conversion into a runnable orchestrator
// ABOUTME: A plan names its tasks, their kinds, dependencies and run policies

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use super::error::{ParserError, Result, ValidationError};
use crate::engine::{EngineConfig, Orchestrator, RetryDelay, TaskDescriptor};
use crate::tasks::TaskRegistry;

/// A YAML plan:
///
/// ```yaml
/// name: nightly-export
/// variables:
///   portal: staging
/// tasks:
///   login:
///     type: command
///     critical: true
///     timeout: 30s
///     config:
///       command: ./login.sh
///   export:
///     type: command
///     depends_on: [login]
///     retries: 2
///     config:
///       script: ./export.sh "$CONDUCTOR_PORTAL"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub tasks: IndexMap<String, TaskSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub retry_delay: Option<RetryDelay>,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl Plan {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .map_err(ParserError::IoError)?;
        Self::from_yaml(&content)
    }

    /// Parse and structurally validate a plan
    pub fn from_yaml(content: &str) -> Result<Self> {
        let plan: Plan = serde_yaml::from_str(content).map_err(ParserError::YamlError)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Checks that do not need a task registry. Unknown dependencies and
    /// cycles are left to the engine, which reports them when the run starts.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ParserError::MissingField("name".to_string()));
        }

        if self.tasks.is_empty() {
            return Err(ValidationError::EmptyPlan.into());
        }

        for (task_id, spec) in &self.tasks {
            for dependency in &spec.depends_on {
                if dependency.trim().is_empty() {
                    return Err(ValidationError::EmptyDependency {
                        task: task_id.clone(),
                    }
                    .into());
                }
                if dependency == task_id {
                    return Err(ValidationError::SelfDependency {
                        task: task_id.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Plan variables as the run config handed to every task body
    pub fn run_config(&self) -> Value {
        let variables = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(variables)
    }

    pub fn build<R>(&self, registry: &TaskRegistry<R>) -> Result<Orchestrator<R>>
    where
        R: Send + Sync + 'static,
    {
        self.build_with_config(registry, EngineConfig::default())
    }

    /// Create one task descriptor per plan entry, with bodies produced by the registry
    pub fn build_with_config<R>(
        &self,
        registry: &TaskRegistry<R>,
        config: EngineConfig,
    ) -> Result<Orchestrator<R>>
    where
        R: Send + Sync + 'static,
    {
        let mut orchestrator = Orchestrator::with_config(self.name.clone(), config);

        for (task_id, spec) in &self.tasks {
            if !registry.supports(&spec.task_type) {
                return Err(ValidationError::UnsupportedTaskType {
                    task: task_id.clone(),
                    task_type: spec.task_type.clone(),
                    supported_types: registry
                        .list_supported_tasks()
                        .into_iter()
                        .map(String::from)
                        .collect(),
                }
                .into());
            }

            let body = registry.create_task(task_id, &spec.task_type, &spec.config)?;
            let mut descriptor = TaskDescriptor::from_shared(task_id.clone(), body)
                .with_dependencies(spec.depends_on.iter().cloned())
                .with_retries(spec.retries)
                .with_critical(spec.critical);

            if let Some(ref name) = spec.name {
                descriptor = descriptor.with_name(name.clone());
            }
            if let Some(ref description) = spec.description {
                descriptor = descriptor.with_description(description.clone());
            }
            if let Some(timeout) = spec.timeout {
                descriptor = descriptor.with_timeout(timeout);
            }
            if let Some(ref retry_delay) = spec.retry_delay {
                descriptor = descriptor.with_retry_delay(retry_delay.clone());
            }

            debug!("Built task {} of type {}", task_id, spec.task_type);
            orchestrator.register(descriptor);
        }

        Ok(orchestrator)
    }
}
