#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Scribe Core
//!
//! Async task and resource management core for AI content-generation
//! pipelines.
//!
//! ## Overview
//!
//! The surrounding application drafts articles with LLM agents and publishes
//! them to content platforms. This crate is its systems layer: everything
//! that coordinates concurrent LLM/HTTP calls, bounds concurrency, pools
//! resources, and isolates failing dependencies lives here, while the agent
//! framework, GUI, and platform formatters stay outside.
//!
//! ## Module Organization
//!
//! - [`tasks`] - Bounded async task manager with status tracking, timeouts,
//!   and deferred error retrieval
//! - [`resilience`] - Per-service circuit breakers
//! - [`transport`] - Pooled HTTP client with TTL response caching
//! - [`memory`] - Byte buffer pool, large-text normalization, RAII resource
//!   tracking
//! - [`pipeline`] - Semaphore-bounded workflow admission
//! - [`events`] - Structured lifecycle event stream
//! - [`config`] - Typed, validated per-component configuration
//! - [`error`] - Crate-level error taxonomy
//! - [`logging`] - Environment-aware structured logging
//!
//! ## Design
//!
//! Components are explicitly constructed and dependency-injected: create
//! them at process start from validated config structs, pass them where
//! they are needed, and tear them down at shutdown. There is no hidden
//! global mutable state, and no state is shared across OS processes (the
//! wider application runs each generation job in its own process).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribe_core::config::CoreConfig;
//! use scribe_core::tasks::{SubmitOptions, TaskManager};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! scribe_core::logging::init_structured_logging();
//! let config = CoreConfig::load(None)?;
//!
//! let manager = TaskManager::new(config.tasks)?;
//! manager.start()?;
//!
//! let task_id = manager.submit_task(
//!     async { Ok(json!({"title": "draft"})) },
//!     SubmitOptions::named("generate_article"),
//! )?;
//! let article = manager.wait_for_task(&task_id, None).await?;
//! println!("generated: {article}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod memory;
pub mod pipeline;
pub mod resilience;
pub mod tasks;
pub mod transport;

pub use config::{
    BufferPoolConfig, CacheConfig, CircuitBreakerConfig, CoreConfig, HttpPoolConfig,
    ProcessorConfig, ResourceMonitorConfig, TaskManagerConfig,
};
pub use error::{Result, ScribeError};
pub use events::{EventLevel, EventPublisher, PipelineEvent};
pub use memory::{normalize_large_text, ByteBufferPool, ResourceTracker};
pub use pipeline::{ContentProcessor, WorkflowEngine, WorkflowOutcome, WorkflowRequest};
pub use resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use tasks::{SubmitOptions, TaskManager, TaskManagerError, TaskStatus};
pub use transport::{HttpPoolError, HttpPoolManager};
