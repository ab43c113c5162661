// ABOUTME: Sleep task that waits for a fixed duration
// ABOUTME: Stops early when its attempt is cancelled

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{parse_config, TaskFactory, Workspace};
use crate::engine::error::Result;
use crate::engine::{ExecutionContext, TaskBody};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepConfig {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

pub struct SleepFactory;

impl TaskFactory<Workspace> for SleepFactory {
    fn task_type(&self) -> &'static str {
        "sleep"
    }

    fn validate_config(&self, task_id: &str, config: &serde_yaml::Value) -> Result<()> {
        parse_config::<SleepConfig>(task_id, config).map(|_| ())
    }

    fn create(
        &self,
        task_id: &str,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn TaskBody<Workspace>>> {
        let config: SleepConfig = parse_config(task_id, config)?;
        Ok(Arc::new(SleepTask {
            duration: config.duration,
        }))
    }
}

pub struct SleepTask {
    duration: Duration,
}

#[async_trait]
impl<R> TaskBody<R> for SleepTask
where
    R: Send + Sync + 'static,
{
    async fn run(&self, context: ExecutionContext<R>) -> anyhow::Result<Value> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                Ok(json!({ "slept_ms": self.duration.as_millis() as u64 }))
            }
            _ = context.cancellation().cancelled() => Err(anyhow!("sleep cancelled")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_config_parsing() {
        let config: serde_yaml::Value = serde_yaml::from_str("duration: 250ms").unwrap();
        assert!(SleepFactory.validate_config("wait", &config).is_ok());

        let bad: serde_yaml::Value = serde_yaml::from_str("duration: soon").unwrap();
        assert!(SleepFactory.validate_config("wait", &bad).is_err());
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let task = SleepTask {
            duration: Duration::from_millis(5),
        };
        let context = ExecutionContext::new(
            "test".to_string(),
            "run_1".to_string(),
            Arc::new(()),
            Value::Null,
        );

        let output = task.run(context).await.unwrap();
        assert_eq!(output, json!({ "slept_ms": 5 }));
    }
}
