// ABOUTME: Human-readable rendering of a run's result set
// ABOUTME: Pure formatting over RunResults with one line per recorded task

use std::fmt::Write;
use std::time::Duration;

use super::result::{RunResults, TaskResult, TaskStatus};

/// Render counts, total duration and one line per task
pub fn render_summary(title: &str, results: &RunResults) -> String {
    let summary = results.summary();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}: {} succeeded, {} failed ({} tasks, {} total)",
        title,
        summary.successful_tasks,
        summary.failed_tasks,
        summary.total_tasks,
        format_duration(summary.total_duration)
    );

    for result in results {
        let _ = writeln!(out, "{}", render_task_line(result));
    }

    out
}

fn render_task_line(result: &TaskResult) -> String {
    let mut line = format!(
        "  {} {} ({})",
        status_glyph(result.status),
        result.task_id,
        format_duration(result.duration)
    );

    if result.retry_count > 0 {
        let _ = write!(line, " [retries: {}]", result.retry_count);
    }
    if let Some(ref error) = result.error {
        let _ = write!(line, " - {}", error);
    }

    line
}

fn status_glyph(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Success => "✓",
        TaskStatus::Failed => "✗",
        TaskStatus::Timeout => "⏱",
        TaskStatus::Blocked => "⊘",
    }
}

// Millisecond precision keeps lines short
fn format_duration(duration: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_millis(duration.as_millis() as u64))
}
