// ABOUTME: Task registry mapping task kinds to factories that build task bodies
// ABOUTME: Explicit, caller-owned registry plus the built-in command and sleep kinds

pub mod command;
pub mod sleep;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::error::{ExecutionError, Result};
use crate::engine::TaskBody;

/// Builds task bodies of one kind from their YAML configuration
pub trait TaskFactory<R>: Send + Sync {
    fn task_type(&self) -> &'static str;
    fn validate_config(&self, task_id: &str, config: &serde_yaml::Value) -> Result<()>;
    fn create(&self, task_id: &str, config: &serde_yaml::Value) -> Result<Arc<dyn TaskBody<R>>>;
}

pub struct TaskRegistry<R> {
    factories: HashMap<String, Box<dyn TaskFactory<R>>>,
}

impl<R> TaskRegistry<R> {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Box<dyn TaskFactory<R>>) {
        let task_type = factory.task_type().to_string();
        self.factories.insert(task_type, factory);
    }

    pub fn get_factory(&self, task_type: &str) -> Option<&dyn TaskFactory<R>> {
        self.factories.get(task_type).map(|f| f.as_ref())
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.factories.contains_key(task_type)
    }

    pub fn validate_task_config(
        &self,
        task_id: &str,
        task_type: &str,
        config: &serde_yaml::Value,
    ) -> Result<()> {
        match self.get_factory(task_type) {
            Some(factory) => factory.validate_config(task_id, config),
            None => Err(ExecutionError::TaskNotSupported {
                task_type: task_type.to_string(),
            }),
        }
    }

    pub fn create_task(
        &self,
        task_id: &str,
        task_type: &str,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn TaskBody<R>>> {
        let factory = self
            .get_factory(task_type)
            .ok_or_else(|| ExecutionError::TaskNotSupported {
                task_type: task_type.to_string(),
            })?;

        factory.validate_config(task_id, config)?;
        factory.create(task_id, config)
    }

    pub fn list_supported_tasks(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl<R> Default for TaskRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource handle for the built-in tasks: the directory commands run in
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }
}

impl TaskRegistry<Workspace> {
    /// Registry with every built-in task kind
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(command::CommandFactory));
        registry.register(Box::new(sleep::SleepFactory));
        registry
    }
}

pub(crate) fn parse_config<T>(task_id: &str, config: &serde_yaml::Value) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_yaml::from_value(config.clone()).map_err(|e| ExecutionError::InvalidConfiguration {
        task_id: task_id.to_string(),
        reason: e.to_string(),
    })
}
