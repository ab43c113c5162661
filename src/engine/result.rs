// ABOUTME: Task result types and the run-scoped result set
// ABOUTME: Records one outcome per attempted or blocked task and aggregates run statistics

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Timeout,
    /// A prerequisite was missing or failed; the body never ran
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub blocked_tasks: usize,
    pub timed_out_tasks: usize,
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
    pub success_rate: f64,
}

/// Results of one run keyed by task id, in the order they were recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunResults {
    results: IndexMap<String, TaskResult>,
}

impl TaskResult {
    pub fn succeeded(
        task_id: String,
        start_time: DateTime<Utc>,
        data: Value,
        retry_count: u32,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Success,
            start_time,
            end_time,
            duration: elapsed(start_time, end_time),
            data: Some(data),
            error: None,
            retry_count,
        }
    }

    pub fn failed(
        task_id: String,
        status: TaskStatus,
        start_time: DateTime<Utc>,
        error: String,
        retry_count: u32,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            task_id,
            status,
            start_time,
            end_time,
            duration: elapsed(start_time, end_time),
            data: None,
            error: Some(error),
            retry_count,
        }
    }

    /// Result for a task whose dependencies were not satisfied
    pub fn blocked(task_id: String, error: String) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Blocked,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            data: None,
            error: Some(error),
            retry_count: 0,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        !self.is_successful()
    }

    pub fn is_timeout(&self) -> bool {
        self.status == TaskStatus::Timeout
    }

    pub fn is_blocked(&self) -> bool {
        self.status == TaskStatus::Blocked
    }
}

fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result, replacing any earlier result for the same task
    pub fn insert(&mut self, result: TaskResult) {
        self.results.insert(result.task_id.clone(), result);
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.results.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.values()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.results.keys().cloned().collect()
    }

    pub fn has_failures(&self) -> bool {
        self.iter().any(|r| r.is_failed())
    }

    pub(crate) fn clear(&mut self) {
        self.results.clear();
    }

    pub fn summary(&self) -> RunSummary {
        let total = self.results.len();
        let successful = self.iter().filter(|r| r.is_successful()).count();
        let blocked = self.iter().filter(|r| r.is_blocked()).count();
        let timed_out = self.iter().filter(|r| r.is_timeout()).count();
        let total_duration = self.iter().map(|r| r.duration).sum();

        let success_rate = if total > 0 {
            (successful as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        RunSummary {
            total_tasks: total,
            successful_tasks: successful,
            failed_tasks: total - successful,
            blocked_tasks: blocked,
            timed_out_tasks: timed_out,
            total_duration,
            success_rate,
        }
    }
}

impl<'a> IntoIterator for &'a RunResults {
    type Item = &'a TaskResult;
    type IntoIter = indexmap::map::Values<'a, String, TaskResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.values()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Timeout => write!(f, "timeout"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}
