// ABOUTME: Error types for the task orchestration engine
// ABOUTME: Separates structural graph errors from run-level critical aborts

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Circular dependency detected at task: {task_id}")]
    CircularDependency { task_id: String },

    #[error("Critical task failed: {task_id} - {message}")]
    CriticalTaskFailed { task_id: String, message: String },

    #[error("Task type not supported: {task_type}")]
    TaskNotSupported { task_type: String },

    #[error("Invalid task configuration: {task_id} - {reason}")]
    InvalidConfiguration { task_id: String, reason: String },
}

impl ExecutionError {
    /// Graph-time errors, detected before any task body runs
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ExecutionError::TaskNotFound { .. } | ExecutionError::CircularDependency { .. }
        )
    }

    /// Whether this error ended a run early because a critical task failed
    pub fn is_critical_abort(&self) -> bool {
        matches!(self, ExecutionError::CriticalTaskFailed { .. })
    }

    /// The task id the error is attributed to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ExecutionError::TaskNotFound { task_id }
            | ExecutionError::CircularDependency { task_id }
            | ExecutionError::CriticalTaskFailed { task_id, .. }
            | ExecutionError::InvalidConfiguration { task_id, .. } => Some(task_id),
            ExecutionError::TaskNotSupported { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let cycle = ExecutionError::CircularDependency {
            task_id: "login".to_string(),
        };
        assert!(cycle.is_structural());
        assert!(!cycle.is_critical_abort());
        assert_eq!(cycle.task_id(), Some("login"));

        let abort = ExecutionError::CriticalTaskFailed {
            task_id: "submit".to_string(),
            message: "form rejected".to_string(),
        };
        assert!(abort.is_critical_abort());
        assert!(!abort.is_structural());
        assert_eq!(
            abort.to_string(),
            "Critical task failed: submit - form rejected"
        );
    }
}
