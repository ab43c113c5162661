// ABOUTME: Attempt loop for a single task: timeout race, bounded retries and retry delays
// ABOUTME: Timed-out bodies are detached rather than aborted unless cancellation is enabled

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::context::ExecutionContext;
use super::result::{TaskResult, TaskStatus};
use super::task::TaskDescriptor;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Wait between a failed attempt and the next one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryDelay {
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    Exponential {
        #[serde(with = "humantime_serde")]
        initial: Duration,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(with = "humantime_serde", default = "default_max_backoff")]
        max: Duration,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::fixed(DEFAULT_RETRY_DELAY)
    }
}

impl RetryDelay {
    pub fn fixed(delay: Duration) -> Self {
        RetryDelay::Fixed { delay }
    }

    pub fn exponential(initial: Duration, multiplier: f64) -> Self {
        RetryDelay::Exponential {
            initial,
            multiplier,
            max: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        match self {
            RetryDelay::Fixed { delay } => *delay,
            RetryDelay::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.powi(retry.min(i32::MAX as u32) as i32);
                if factor.is_nan() || factor < 0.0 {
                    return (*initial).min(*max);
                }

                let nanos = (initial.as_nanos() as f64 * factor).round();
                if nanos >= u64::MAX as f64 {
                    return *max;
                }
                Duration::from_nanos(nanos as u64).min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Applied to tasks that do not set their own timeout
    #[serde(with = "humantime_serde", default = "default_task_timeout")]
    pub default_timeout: Duration,

    #[serde(default)]
    pub retry_delay: RetryDelay,

    /// Fire the attempt's cancellation token when it times out. Bodies that
    /// ignore the token keep running either way.
    #[serde(default)]
    pub cancel_on_timeout: bool,
}

fn default_task_timeout() -> Duration {
    DEFAULT_TASK_TIMEOUT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TASK_TIMEOUT,
            retry_delay: RetryDelay::default(),
            cancel_on_timeout: false,
        }
    }
}

enum AttemptOutcome {
    Completed(Value),
    Failed(String),
    TimedOut(Duration),
}

pub struct TaskScheduler {
    config: EngineConfig,
}

impl TaskScheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a task body up to `retries + 1` times and produce its final result
    pub async fn execute_task_with_retry<R>(
        &self,
        task: &TaskDescriptor<R>,
        context: &ExecutionContext<R>,
    ) -> TaskResult
    where
        R: Send + Sync + 'static,
    {
        let max_attempts = task.max_attempts();
        let timeout_duration = task.timeout.unwrap_or(self.config.default_timeout);
        let retry_delay = task.retry_delay.as_ref().unwrap_or(&self.config.retry_delay);
        let start_time = Utc::now();
        let mut current_attempt = 0;

        loop {
            current_attempt += 1;

            info!(
                "Executing task {} (attempt {}/{})",
                task.id, current_attempt, max_attempts
            );

            let attempt_context = context.for_task(&task.id, current_attempt);
            let outcome = self
                .run_attempt(task, attempt_context, timeout_duration)
                .await;

            let (status, message) = match outcome {
                AttemptOutcome::Completed(data) => {
                    debug!("Task {} succeeded on attempt {}", task.id, current_attempt);
                    return TaskResult::succeeded(
                        task.id.clone(),
                        start_time,
                        data,
                        current_attempt - 1,
                    );
                }
                AttemptOutcome::Failed(message) => (TaskStatus::Failed, message),
                AttemptOutcome::TimedOut(after) => (
                    TaskStatus::Timeout,
                    format!(
                        "attempt timed out after {}",
                        humantime::format_duration(after)
                    ),
                ),
            };

            warn!(
                "Task {} failed on attempt {}: {}",
                task.id, current_attempt, message
            );

            if current_attempt >= max_attempts {
                error!(
                    "Task {} failed after {} attempts",
                    task.id, current_attempt
                );
                return TaskResult::failed(task.id.clone(), status, start_time, message, task.retries);
            }

            let delay = retry_delay.calculate_delay(current_attempt - 1);
            debug!("Waiting {:?} before retrying task {}", delay, task.id);
            sleep(delay).await;
        }
    }

    /// Race one spawned attempt against the timer. The losing body is not
    /// aborted: dropping its handle detaches it.
    async fn run_attempt<R>(
        &self,
        task: &TaskDescriptor<R>,
        context: ExecutionContext<R>,
        timeout_duration: Duration,
    ) -> AttemptOutcome
    where
        R: Send + Sync + 'static,
    {
        let body = Arc::clone(&task.body);
        let cancel_handle = context.clone();
        let mut handle = tokio::spawn(async move { body.run(context).await });

        tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(Ok(data)) => AttemptOutcome::Completed(data),
                Ok(Err(err)) => AttemptOutcome::Failed(format!("{:#}", err)),
                Err(join_error) => AttemptOutcome::Failed(describe_join_error(join_error)),
            },
            _ = sleep(timeout_duration) => {
                if self.config.cancel_on_timeout {
                    debug!("Signalling cancellation to timed-out task {}", task.id);
                    cancel_handle.cancel();
                }
                AttemptOutcome::TimedOut(timeout_duration)
            }
        }
    }
}

fn describe_join_error(join_error: JoinError) -> String {
    if join_error.is_panic() {
        format!("task body panicked: {}", join_error)
    } else {
        format!("task body was cancelled: {}", join_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(EngineConfig {
            retry_delay: RetryDelay::fixed(Duration::from_millis(1)),
            ..EngineConfig::default()
        })
    }

    fn context() -> ExecutionContext<()> {
        ExecutionContext::new(
            "test".to_string(),
            "run_1".to_string(),
            Arc::new(()),
            Value::Null,
        )
    }

    #[test]
    fn test_retry_delay_calculation() {
        let fixed = RetryDelay::fixed(Duration::from_millis(250));
        assert_eq!(fixed.calculate_delay(0), Duration::from_millis(250));
        assert_eq!(fixed.calculate_delay(5), Duration::from_millis(250));

        let backoff = RetryDelay::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_millis(300),
        };
        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(300));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(300));

        let sub_millisecond = RetryDelay::Exponential {
            initial: Duration::from_micros(500),
            multiplier: 2.0,
            max: Duration::from_secs(1),
        };
        assert_eq!(sub_millisecond.calculate_delay(0), Duration::from_micros(500));
        assert_eq!(sub_millisecond.calculate_delay(1), Duration::from_millis(1));
        assert_eq!(sub_millisecond.calculate_delay(2), Duration::from_millis(2));

        let fractional = RetryDelay::exponential(Duration::from_millis(100), 1.5);
        assert_eq!(fractional.calculate_delay(1), Duration::from_millis(150));
    }

    #[test]
    fn test_engine_config_from_yaml() {
        let config: EngineConfig = serde_yaml::from_str(
            "default_timeout: 30s\nretry_delay:\n  strategy: exponential\n  initial: 500ms\n",
        )
        .unwrap();

        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(
            config.retry_delay,
            RetryDelay::exponential(Duration::from_millis(500), 2.0)
        );
        assert!(!config.cancel_on_timeout);

        let defaults: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaults, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let task = TaskDescriptor::from_fn("ok", |_ctx| async { Ok(json!("done")) });
        let result = scheduler().execute_task_with_retry(&task, &context()).await;

        assert!(result.is_successful());
        assert_eq!(result.retry_count, 0);
        assert_eq!(result.data, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task = TaskDescriptor::from_fn("flaky", move |ctx: ExecutionContext<()>| {
            let counter = Arc::clone(&counter);
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(ctx.attempt, call);
                if call < 3 {
                    anyhow::bail!("attempt {} failed", call);
                }
                Ok(json!(call))
            }
        })
        .with_retries(2);

        let result = scheduler().execute_task_with_retry(&task, &context()).await;

        assert!(result.is_successful());
        assert_eq!(result.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task = TaskDescriptor::from_fn("broken", move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                anyhow::bail!("failure #{}", call)
            }
        })
        .with_retries(1);

        let result = scheduler().execute_task_with_retry(&task, &context()).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.error.as_deref(), Some("failure #2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_body_is_a_failed_attempt() {
        let task = TaskDescriptor::from_fn("panics", |_ctx| async {
            if true {
                panic!("selector table out of date");
            }
            Ok(Value::Null)
        });

        let result = scheduler().execute_task_with_retry(&task, &context()).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_aborted_body_is_not_reported_as_panic() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let join_error = handle.await.unwrap_err();

        let message = describe_join_error(join_error);
        assert!(message.contains("cancelled"));
        assert!(!message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_cancel_on_timeout_signals_body() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let task = TaskDescriptor::from_fn("slow", move |ctx: ExecutionContext<()>| {
            let flag = Arc::clone(&flag);
            async move {
                ctx.cancellation().cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
        .with_timeout(Duration::from_millis(20));

        let scheduler = TaskScheduler::new(EngineConfig {
            cancel_on_timeout: true,
            ..EngineConfig::default()
        });
        let result = scheduler.execute_task_with_retry(&task, &context()).await;
        assert!(result.is_timeout());

        sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
    }
}
