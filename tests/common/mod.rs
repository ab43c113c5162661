// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides counting, flaky and slow task bodies plus plan file builders

#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

use conductor::engine::{EngineConfig, Orchestrator, RetryDelay, TaskDescriptor};

/// Orchestrator with a short retry delay so retry tests stay fast
pub fn fast_orchestrator<R>(name: &str) -> Orchestrator<R>
where
    R: Send + Sync + 'static,
{
    Orchestrator::with_config(
        name,
        EngineConfig {
            retry_delay: RetryDelay::fixed(Duration::from_millis(5)),
            ..EngineConfig::default()
        },
    )
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Succeeds with `{"task": id}` and counts invocations
pub fn counting_task(id: &str, counter: &Counter) -> TaskDescriptor<()> {
    let counter = counter.clone();
    let payload = json!({ "task": id });
    TaskDescriptor::from_fn(id, move |_ctx| {
        counter.bump();
        let payload = payload.clone();
        async move { Ok(payload) }
    })
}

/// Always fails with `message` and counts invocations
pub fn failing_task(id: &str, message: &str, counter: &Counter) -> TaskDescriptor<()> {
    let counter = counter.clone();
    let message = message.to_string();
    TaskDescriptor::from_fn(id, move |_ctx| {
        counter.bump();
        let message = message.clone();
        async move { Err(anyhow::anyhow!(message)) }
    })
}

/// Fails on the first `failures` invocations, then succeeds
pub fn flaky_task(id: &str, failures: u32, counter: &Counter) -> TaskDescriptor<()> {
    let counter = counter.clone();
    TaskDescriptor::from_fn(id, move |_ctx| {
        let attempt = counter.bump();
        async move {
            if attempt <= failures {
                anyhow::bail!("transient failure on attempt {}", attempt);
            }
            Ok(json!({ "attempt": attempt }))
        }
    })
}

/// Sleeps for `duration`, then raises `finished`
pub fn slow_task(id: &str, duration: Duration, finished: Arc<AtomicBool>) -> TaskDescriptor<()> {
    TaskDescriptor::from_fn(id, move |_ctx| {
        let finished = finished.clone();
        async move {
            tokio::time::sleep(duration).await;
            finished.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        }
    })
}

pub struct TestPlanBuilder {
    name: String,
    variables: Vec<(String, String)>,
    tasks: Vec<String>,
}

impl TestPlanBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            variables: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_variable(mut self, key: &str, value: &str) -> Self {
        self.variables.push((key.to_string(), value.to_string()));
        self
    }

    /// Raw YAML body for one task, indented under its id
    pub fn with_task(mut self, id: &str, body: &str) -> Self {
        let mut block = format!("  {}:\n", id);
        for line in body.trim().lines() {
            block.push_str("    ");
            block.push_str(line);
            block.push('\n');
        }
        self.tasks.push(block);
        self
    }

    pub fn add_script_task(self, id: &str, script: &str, depends_on: &[&str]) -> Self {
        let body = format!(
            "type: command\ndepends_on: [{}]\nconfig:\n  script: '{}'",
            depends_on.join(", "),
            script.replace('\'', "''")
        );
        self.with_task(id, &body)
    }

    pub fn to_yaml(&self) -> String {
        let mut yaml = format!("name: {}\n", self.name);
        if !self.variables.is_empty() {
            yaml.push_str("variables:\n");
            for (key, value) in &self.variables {
                yaml.push_str(&format!("  {}: {}\n", key, value));
            }
        }
        yaml.push_str("tasks:\n");
        for task in &self.tasks {
            yaml.push_str(task);
        }
        yaml
    }

    pub async fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.to_yaml()).await
    }
}

pub async fn write_plan(dir: &TempDir, builder: &TestPlanBuilder) -> PathBuf {
    let path = dir.path().join("plan.yaml");
    builder
        .write_to_file(&path)
        .await
        .expect("failed to write plan file");
    path
}
