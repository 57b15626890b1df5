//! # Bounded Async Task Manager
//!
//! Owns the lifecycle of every submitted task: a bounded FIFO queue feeds a
//! dispatch loop that acquires one of `max_workers` run permits per task and
//! spawns an execution for it. Errors raised inside a task are captured on
//! its record and only surface when the caller awaits the result; a failing
//! task never stops the dispatch loop.
//!
//! The manager is explicitly constructed and dependency-injected. Create it
//! at process start, call [`TaskManager::start`], and tear it down with
//! [`TaskManager::stop`] at shutdown.

use crate::config::TaskManagerConfig;
use crate::error::{Result as ScribeResult, ScribeError};
use crate::tasks::task::{
    SubmitOptions, TaskCounts, TaskFailure, TaskOutput, TaskRecord, TaskSnapshot, TaskStatus,
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the task manager to its callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskManagerError {
    /// The bounded submission queue is full; nothing was enqueued.
    #[error("task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// `wait_for_task` gave up before the task reached a terminal state.
    #[error("timed out waiting for task {task_id}")]
    WaitTimeout { task_id: String },

    /// The task raised internally; the original error is preserved.
    #[error("task {task_id} failed: {failure}")]
    TaskFailed {
        task_id: String,
        failure: TaskFailure,
    },

    /// The task exceeded its per-task wall-clock timeout.
    #[error("task {task_id} timed out after {timeout:?}")]
    TaskTimedOut {
        task_id: String,
        timeout: Duration,
    },

    #[error("task {task_id} was cancelled")]
    TaskCancelled { task_id: String },

    #[error("unknown task: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("task manager is shutting down")]
    ShuttingDown,
}

struct QueuedTask {
    task_id: String,
    future: BoxFuture<'static, anyhow::Result<TaskOutput>>,
}

/// Bounded async task manager with per-task status, timeout, and result
/// retrieval.
pub struct TaskManager {
    config: TaskManagerConfig,
    tasks: Arc<DashMap<String, TaskRecord>>,
    queue_tx: mpsc::Sender<QueuedTask>,
    queue_rx: parking_lot::Mutex<Option<mpsc::Receiver<QueuedTask>>>,
    run_permits: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
    dispatch: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> ScribeResult<Self> {
        config.validate()?;
        let (queue_tx, queue_rx) = mpsc::channel(config.max_concurrent_tasks);

        info!(
            max_workers = config.max_workers,
            max_concurrent_tasks = config.max_concurrent_tasks,
            "Task manager initialized"
        );

        Ok(Self {
            run_permits: Arc::new(Semaphore::new(config.max_workers)),
            config,
            tasks: Arc::new(DashMap::new()),
            queue_tx,
            queue_rx: parking_lot::Mutex::new(Some(queue_rx)),
            shutdown: Arc::new(AtomicBool::new(false)),
            dispatch: parking_lot::Mutex::new(None),
        })
    }

    /// Spawn the dispatch loop. Must be called once from within a tokio
    /// runtime before tasks will execute.
    pub fn start(&self) -> ScribeResult<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ScribeError::TaskError(
                "task manager is shutting down".to_string(),
            ));
        }

        let Some(mut queue_rx) = self.queue_rx.lock().take() else {
            warn!("Task manager already started");
            return Ok(());
        };

        let tasks = Arc::clone(&self.tasks);
        let run_permits = Arc::clone(&self.run_permits);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            while let Some(queued) = queue_rx.recv().await {
                if shutdown.load(Ordering::Acquire) {
                    if let Some(mut record) = tasks.get_mut(&queued.task_id) {
                        record.transition(TaskStatus::Cancelled);
                        record.finished_at = Some(Instant::now());
                    }
                    continue;
                }

                // Single source of truth for execution concurrency: one run
                // permit per in-flight task, FIFO dequeue preserved.
                let permit = match Arc::clone(&run_permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let task_id = queued.task_id.clone();
                let exec_tasks = Arc::clone(&tasks);
                let exec = tokio::spawn(async move {
                    let _permit = permit;
                    execute_task(exec_tasks, task_id, queued.future).await;
                });

                match tasks.get_mut(&queued.task_id) {
                    Some(record) if record.status == TaskStatus::Cancelled => {
                        exec.abort();
                    }
                    Some(mut record) => {
                        record.abort = Some(exec.abort_handle());
                    }
                    None => exec.abort(),
                }
            }
            debug!("Task dispatch loop exited");
        });

        *self.dispatch.lock() = Some(handle);
        info!("Task manager started");
        Ok(())
    }

    /// Enqueue an async task. The future's error is captured on the record
    /// and re-raised only by `wait_for_task`.
    pub fn submit_task<F>(
        &self,
        future: F,
        options: SubmitOptions,
    ) -> Result<String, TaskManagerError>
    where
        F: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(TaskManagerError::ShuttingDown);
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let name = options.name.clone();
        self.tasks
            .insert(task_id.clone(), TaskRecord::new(task_id.clone(), options));

        let queued = QueuedTask {
            task_id: task_id.clone(),
            future: future.boxed(),
        };

        match self.queue_tx.try_send(queued) {
            Ok(()) => {
                info!(task_id = %task_id, name = %name, "Task submitted");
                Ok(task_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.tasks.remove(&task_id);
                warn!(task_id = %task_id, name = %name, "Task queue full, submission rejected");
                Err(TaskManagerError::QueueFull {
                    capacity: self.config.max_concurrent_tasks,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.tasks.remove(&task_id);
                Err(TaskManagerError::ShuttingDown)
            }
        }
    }

    /// Enqueue a blocking closure, executed on the blocking thread pool and
    /// otherwise treated identically to an async task. Cancellation cannot
    /// interrupt a closure that is already running.
    pub fn submit_blocking_task<F>(
        &self,
        func: F,
        options: SubmitOptions,
    ) -> Result<String, TaskManagerError>
    where
        F: FnOnce() -> anyhow::Result<TaskOutput> + Send + 'static,
    {
        let future = async move {
            match tokio::task::spawn_blocking(func).await {
                Ok(result) => result,
                Err(join_error) => Err(anyhow::anyhow!("blocking task panicked: {join_error}")),
            }
        };
        self.submit_task(future, options)
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.get(task_id).map(|record| record.status)
    }

    pub fn task_result(&self, task_id: &str) -> Option<TaskOutput> {
        self.tasks.get(task_id).and_then(|record| record.result.clone())
    }

    pub fn task_error(&self, task_id: &str) -> Option<TaskFailure> {
        self.tasks.get(task_id).and_then(|record| record.error.clone())
    }

    pub fn task_duration(&self, task_id: &str) -> Option<Duration> {
        self.tasks.get(task_id).and_then(|record| record.duration())
    }

    pub fn task_snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.get(task_id).map(|record| record.snapshot())
    }

    pub fn all_tasks(&self) -> Vec<TaskSnapshot> {
        self.tasks.iter().map(|record| record.snapshot()).collect()
    }

    pub fn task_counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for record in self.tasks.iter() {
            counts.total += 1;
            match record.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
                TaskStatus::TimedOut => counts.timed_out += 1,
            }
        }
        counts
    }

    pub fn running_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|record| record.status == TaskStatus::Running)
            .count()
    }

    /// Poll until the task reaches a terminal state, then return its result
    /// or re-raise its stored failure.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        wait_timeout: Option<Duration>,
    ) -> Result<TaskOutput, TaskManagerError> {
        let deadline = wait_timeout.map(|t| Instant::now() + t);

        loop {
            {
                let Some(record) = self.tasks.get(task_id) else {
                    return Err(TaskManagerError::TaskNotFound {
                        task_id: task_id.to_string(),
                    });
                };
                match record.status {
                    TaskStatus::Completed => {
                        return Ok(record.result.clone().unwrap_or(TaskOutput::Null));
                    }
                    TaskStatus::Failed => {
                        let failure = record.error.clone().unwrap_or_else(|| {
                            TaskFailure::new(anyhow::anyhow!("task failed without stored error"))
                        });
                        return Err(TaskManagerError::TaskFailed {
                            task_id: task_id.to_string(),
                            failure,
                        });
                    }
                    TaskStatus::TimedOut => {
                        return Err(TaskManagerError::TaskTimedOut {
                            task_id: task_id.to_string(),
                            timeout: record.timeout.unwrap_or_default(),
                        });
                    }
                    TaskStatus::Cancelled => {
                        return Err(TaskManagerError::TaskCancelled {
                            task_id: task_id.to_string(),
                        });
                    }
                    TaskStatus::Pending | TaskStatus::Running => {}
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(TaskManagerError::WaitTimeout {
                        task_id: task_id.to_string(),
                    });
                }
            }

            tokio::time::sleep(self.config.wait_poll_interval()).await;
        }
    }

    /// Best-effort cancellation: flips the status and aborts the underlying
    /// execution. Blocking closures already running are not interrupted.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let abort = {
            let Some(mut record) = self.tasks.get_mut(task_id) else {
                return false;
            };
            if record.status.is_terminal() {
                return false;
            }
            record.transition(TaskStatus::Cancelled);
            record.finished_at = Some(Instant::now());
            record.abort.take()
        };

        if let Some(handle) = abort {
            handle.abort();
        }
        info!(task_id = %task_id, "Task cancelled");
        true
    }

    pub fn cancel_all_tasks(&self) -> usize {
        let task_ids: Vec<String> = self
            .tasks
            .iter()
            .filter(|record| !record.status.is_terminal())
            .map(|record| record.task_id.clone())
            .collect();

        let mut cancelled = 0;
        for task_id in task_ids {
            if self.cancel_task(&task_id) {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled outstanding tasks");
        }
        cancelled
    }

    /// Garbage-collect terminal task records older than `max_age`.
    pub fn remove_completed_tasks(&self, max_age: Duration) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, record| {
            if !record.status.is_terminal() {
                return true;
            }
            match record.finished_at {
                Some(finished) => finished.elapsed() <= max_age,
                None => true,
            }
        });
        let removed = before - self.tasks.len();
        if removed > 0 {
            info!(removed, "Purged expired task records");
        }
        removed
    }

    /// Refuse new submissions, cancel outstanding tasks, and wait up to
    /// `timeout` for running executions to drain.
    pub async fn stop(&self, timeout: Duration) {
        info!("Stopping task manager");
        self.shutdown.store(true, Ordering::Release);
        self.cancel_all_tasks();

        let deadline = Instant::now() + timeout;
        while self.running_task_count() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    remaining = self.running_task_count(),
                    "Shutdown timeout reached with tasks still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if let Some(handle) = self.dispatch.lock().take() {
            handle.abort();
        }
        info!("Task manager stopped");
    }
}

/// Run one task to a terminal state, capturing its outcome on the record.
async fn execute_task(
    tasks: Arc<DashMap<String, TaskRecord>>,
    task_id: String,
    future: BoxFuture<'static, anyhow::Result<TaskOutput>>,
) {
    let task_timeout = {
        let Some(mut record) = tasks.get_mut(&task_id) else {
            return;
        };
        if !record.transition(TaskStatus::Running) {
            // Cancelled between dequeue and execution
            return;
        }
        record.started_at = Some(Instant::now());
        record.timeout
    };

    debug!(task_id = %task_id, "Task execution started");

    let outcome = match task_timeout {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => Ok(result),
            Err(_) => Err(limit),
        },
        None => Ok(future.await),
    };

    let (callback, snapshot) = {
        let Some(mut record) = tasks.get_mut(&task_id) else {
            return;
        };
        match outcome {
            Ok(Ok(output)) => {
                if record.transition(TaskStatus::Completed) {
                    record.result = Some(output);
                    debug!(task_id = %task_id, "Task completed");
                }
            }
            Ok(Err(task_error)) => {
                if record.transition(TaskStatus::Failed) {
                    error!(task_id = %task_id, error = %task_error, "Task failed");
                    record.error = Some(TaskFailure::new(task_error));
                }
            }
            Err(limit) => {
                if record.transition(TaskStatus::TimedOut) {
                    warn!(task_id = %task_id, timeout = ?limit, "Task timed out");
                    record.error = Some(TaskFailure::new(anyhow::anyhow!(
                        "task timed out after {limit:?}"
                    )));
                }
            }
        }
        record.finished_at = Some(Instant::now());
        (record.callback.clone(), record.snapshot())
    };

    if let Some(callback) = callback {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(snapshot);
        }));
        if result.is_err() {
            error!(task_id = %task_id, "Task completion callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(workers: usize, queue: usize) -> TaskManager {
        let manager = TaskManager::new(TaskManagerConfig {
            max_workers: workers,
            max_concurrent_tasks: queue,
            wait_poll_interval_ms: 10,
        })
        .unwrap();
        manager.start().unwrap();
        manager
    }

    #[tokio::test]
    async fn async_task_completes_with_result() {
        let manager = manager(4, 16);
        let task_id = manager
            .submit_task(async { Ok(json!("A")) }, SubmitOptions::named("simple"))
            .unwrap();

        let result = manager.wait_for_task(&task_id, Some(Duration::from_secs(5))).await;
        assert_eq!(result.unwrap(), json!("A"));
        assert_eq!(manager.task_status(&task_id), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn failed_task_reraises_original_error() {
        let manager = manager(4, 16);
        let task_id = manager
            .submit_task(
                async {
                    Err(anyhow::anyhow!(std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "token rejected"
                    )))
                },
                SubmitOptions::named("failing"),
            )
            .unwrap();

        let err = manager
            .wait_for_task(&task_id, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        match err {
            TaskManagerError::TaskFailed { failure, .. } => {
                assert_eq!(failure.message(), "token rejected");
                assert!(failure.downcast_ref::<std::io::Error>().is_some());
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
        assert_eq!(manager.task_status(&task_id), Some(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn task_timeout_is_terminal_and_reported() {
        let manager = manager(4, 16);
        let task_id = manager
            .submit_task(
                async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(json!("too late"))
                },
                SubmitOptions::named("slow").with_timeout(Duration::from_millis(100)),
            )
            .unwrap();

        let err = manager
            .wait_for_task(&task_id, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskManagerError::TaskTimedOut { .. }));
        assert_eq!(manager.task_status(&task_id), Some(TaskStatus::TimedOut));
        assert!(manager.task_error(&task_id).is_some());
    }

    #[tokio::test]
    async fn full_queue_rejects_submission() {
        // No start(): nothing drains the queue.
        let manager = TaskManager::new(TaskManagerConfig {
            max_workers: 1,
            max_concurrent_tasks: 2,
            wait_poll_interval_ms: 10,
        })
        .unwrap();

        for _ in 0..2 {
            manager
                .submit_task(async { Ok(TaskOutput::Null) }, SubmitOptions::named("filler"))
                .unwrap();
        }

        let err = manager
            .submit_task(async { Ok(TaskOutput::Null) }, SubmitOptions::named("overflow"))
            .unwrap_err();
        assert!(matches!(err, TaskManagerError::QueueFull { capacity: 2 }));
    }

    #[tokio::test]
    async fn wait_times_out_on_stuck_task() {
        let manager = manager(1, 8);
        let task_id = manager
            .submit_task(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(TaskOutput::Null)
                },
                SubmitOptions::named("stuck"),
            )
            .unwrap();

        let err = manager
            .wait_for_task(&task_id, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskManagerError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn cancelled_task_reports_cancellation() {
        let manager = manager(1, 8);
        let task_id = manager
            .submit_task(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(TaskOutput::Null)
                },
                SubmitOptions::named("cancel me"),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.cancel_task(&task_id));

        let err = manager
            .wait_for_task(&task_id, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskManagerError::TaskCancelled { .. }));

        // Terminal: cancelling again is a no-op
        assert!(!manager.cancel_task(&task_id));
    }

    #[tokio::test]
    async fn blocking_task_runs_on_blocking_pool() {
        let manager = manager(2, 8);
        let task_id = manager
            .submit_blocking_task(
                || {
                    std::thread::sleep(Duration::from_millis(100));
                    Ok(json!(42))
                },
                SubmitOptions::named("blocking"),
            )
            .unwrap();

        let result = manager
            .wait_for_task(&task_id, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn completion_callback_receives_terminal_snapshot() {
        let manager = manager(2, 8);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let callback: crate::tasks::TaskCallback = Arc::new(move |snapshot| {
            let _ = tx.send(snapshot.status);
        });
        let task_id = manager
            .submit_task(
                async { Ok(json!("done")) },
                SubmitOptions::named("with callback").with_callback(callback),
            )
            .unwrap();

        manager
            .wait_for_task(&task_id, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_tasks() {
        let manager = manager(2, 8);
        let done = manager
            .submit_task(async { Ok(TaskOutput::Null) }, SubmitOptions::named("done"))
            .unwrap();
        manager
            .wait_for_task(&done, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        let running = manager
            .submit_task(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(TaskOutput::Null)
                },
                SubmitOptions::named("running"),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Zero max_age removes every terminal record, never live ones
        let removed = manager.remove_completed_tasks(Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(manager.task_status(&done).is_none());
        assert!(manager.task_status(&running).is_some());
    }

    #[tokio::test]
    async fn submissions_rejected_after_stop() {
        let manager = manager(2, 8);
        manager.stop(Duration::from_secs(1)).await;

        let err = manager
            .submit_task(async { Ok(TaskOutput::Null) }, SubmitOptions::named("late"))
            .unwrap_err();
        assert!(matches!(err, TaskManagerError::ShuttingDown));
    }

    #[tokio::test]
    async fn task_counts_track_statuses() {
        let manager = manager(2, 8);
        let done = manager
            .submit_task(async { Ok(TaskOutput::Null) }, SubmitOptions::named("a"))
            .unwrap();
        manager
            .wait_for_task(&done, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        let failed = manager
            .submit_task(
                async { Err(anyhow::anyhow!("nope")) },
                SubmitOptions::named("b"),
            )
            .unwrap();
        let _ = manager.wait_for_task(&failed, Some(Duration::from_secs(5))).await;

        let counts = manager.task_counts();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
    }
}
