//! # Content Processor
//!
//! Admission control for whole content-generation workflows. A semaphore
//! bounds how many workflows generate at once; the actual generation lives
//! behind the [`WorkflowEngine`] seam. Lifecycle events are published for
//! the web layer and log bridge.
//!
//! Workflow admission is independent from task execution concurrency: the
//! processor gates entire generation runs, while the task manager's run
//! permits bound the individual operations those runs submit.

use crate::config::ProcessorConfig;
use crate::events::{EventLevel, EventPublisher};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// One content-generation request handed to the engine.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub name: String,
    pub inputs: Value,
}

impl WorkflowRequest {
    pub fn new(name: impl Into<String>, inputs: Value) -> Self {
        Self {
            name: name.into(),
            inputs,
        }
    }
}

/// Result payload produced by a completed workflow.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub payload: Value,
}

/// Seam behind which article generation lives. The production engine wires
/// the LLM agents; tests supply stubs.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute(&self, request: WorkflowRequest) -> anyhow::Result<WorkflowOutcome>;
}

/// Errors surfaced by the processor.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("content processor is shutting down")]
    ShuttingDown,

    #[error("workflow {name} failed: {source}")]
    WorkflowFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Semaphore-bounded workflow runner.
pub struct ContentProcessor {
    permits: Arc<Semaphore>,
    events: EventPublisher,
    shutdown: AtomicBool,
}

impl ContentProcessor {
    pub fn new(config: ProcessorConfig, events: EventPublisher) -> crate::error::Result<Self> {
        config.validate()?;
        info!(
            max_concurrency = config.max_concurrency,
            "Content processor initialized"
        );
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            events,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Run one workflow under the concurrency bound, publishing lifecycle
    /// events. Engine errors are published and then propagated.
    pub async fn run_workflow(
        &self,
        engine: &dyn WorkflowEngine,
        request: WorkflowRequest,
    ) -> Result<WorkflowOutcome, ProcessorError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ProcessorError::ShuttingDown);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProcessorError::ShuttingDown)?;

        let name = request.name.clone();
        self.events.emit(
            "workflow_started",
            format!("workflow {name} started"),
            EventLevel::Status,
        );

        let started = Instant::now();
        match engine.execute(request).await {
            Ok(outcome) => {
                let elapsed = started.elapsed();
                info!(workflow = %name, duration_ms = elapsed.as_millis(), "Workflow completed");
                self.events.emit(
                    "workflow_completed",
                    format!("workflow {name} completed in {:.1}s", elapsed.as_secs_f64()),
                    EventLevel::Status,
                );
                Ok(outcome)
            }
            Err(source) => {
                error!(workflow = %name, error = %source, "Workflow failed");
                self.events.emit(
                    "workflow_failed",
                    format!("workflow {name} failed: {source}"),
                    EventLevel::Error,
                );
                Err(ProcessorError::WorkflowFailed { name, source })
            }
        }
    }

    /// Run a batch concurrently; every run is still gated by the semaphore.
    pub async fn run_all(
        &self,
        engine: &dyn WorkflowEngine,
        requests: Vec<WorkflowRequest>,
    ) -> Vec<Result<WorkflowOutcome, ProcessorError>> {
        let runs = requests
            .into_iter()
            .map(|request| self.run_workflow(engine, request));
        futures::future::join_all(runs).await
    }

    /// Refuse further workflow submissions.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.permits.close();
        info!("Content processor shut down");
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }
}
