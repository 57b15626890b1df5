//! Task records and the forward-only status state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::warn;

/// JSON payload produced by a task on success.
pub type TaskOutput = Value;

/// Callback invoked with a snapshot of the task after it reaches a
/// terminal state.
pub type TaskCallback = Arc<dyn Fn(TaskSnapshot) + Send + Sync>;

/// Lifecycle states of a managed task.
///
/// Transitions only move forward: `Pending → Running → {Completed | Failed |
/// Cancelled | TimedOut}`, plus `Pending → Cancelled` for tasks cancelled
/// before dispatch. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::TimedOut
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(
                next,
                TaskStatus::Running | TaskStatus::Cancelled
            ),
            TaskStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        };
        write!(f, "{name}")
    }
}

/// Cheaply clonable carrier for the error a task raised internally.
///
/// The original error is preserved verbatim: `Display` forwards to it and
/// `downcast_ref` recovers the concrete type.
#[derive(Clone)]
pub struct TaskFailure(Arc<anyhow::Error>);

impl TaskFailure {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn message(&self) -> String {
        self.0.to_string()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref()
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Options supplied at submission time.
#[derive(Default, Clone)]
pub struct SubmitOptions {
    pub name: String,
    pub timeout: Option<Duration>,
    pub callback: Option<TaskCallback>,
    pub metadata: HashMap<String, Value>,
}

impl SubmitOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_callback(mut self, callback: TaskCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Internal bookkeeping for one submitted task. Mutated only by the owning
/// manager; external callers observe it through [`TaskSnapshot`].
pub(crate) struct TaskRecord {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<TaskOutput>,
    pub error: Option<TaskFailure>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub timeout: Option<Duration>,
    pub callback: Option<TaskCallback>,
    pub metadata: HashMap<String, Value>,
    pub abort: Option<AbortHandle>,
}

impl TaskRecord {
    pub fn new(task_id: String, options: SubmitOptions) -> Self {
        Self {
            task_id,
            name: options.name,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            timeout: options.timeout,
            callback: options.callback,
            metadata: options.metadata,
            abort: None,
        }
    }

    /// Apply a forward transition. Rejected transitions are logged and
    /// leave the record untouched.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            warn!(
                task_id = %self.task_id,
                from = %self.status,
                to = %next,
                "Rejected backward task status transition"
            );
            false
        }
    }

    /// Wall-clock execution time so far, or total once finished.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(match self.finished_at {
            Some(finished) => finished.duration_since(started),
            None => started.elapsed(),
        })
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.task_id.clone(),
            name: self.name.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            submitted_at: self.submitted_at,
            duration: self.duration(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Read-only view of a task's state handed to lookups and callbacks.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<TaskOutput>,
    pub error: Option<TaskFailure>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub duration: Option<Duration>,
    pub metadata: HashMap<String, Value>,
}

/// Per-status task census.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::TimedOut,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Completed,
                TaskStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn pending_can_run_or_cancel_only() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn failure_preserves_message_and_type() {
        let failure = TaskFailure::new(anyhow::anyhow!(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "template missing"
        )));
        assert_eq!(failure.message(), "template missing");
        assert!(failure.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn record_rejects_backward_transition() {
        let mut record = TaskRecord::new("t1".to_string(), SubmitOptions::named("demo"));
        assert!(record.transition(TaskStatus::Running));
        assert!(record.transition(TaskStatus::Completed));
        assert!(!record.transition(TaskStatus::Running));
        assert_eq!(record.status, TaskStatus::Completed);
    }
}
