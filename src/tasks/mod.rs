//! # Task Management Module
//!
//! Bounded async task execution with per-task status tracking, timeouts,
//! best-effort cancellation, and deferred error retrieval.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scribe_core::config::TaskManagerConfig;
//! use scribe_core::tasks::{SubmitOptions, TaskManager};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = TaskManager::new(TaskManagerConfig::default())?;
//! manager.start()?;
//!
//! let task_id = manager.submit_task(
//!     async { Ok(json!({"title": "draft"})) },
//!     SubmitOptions::named("generate_article"),
//! )?;
//!
//! let result = manager.wait_for_task(&task_id, None).await?;
//! println!("article: {result}");
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod task;

pub use manager::{TaskManager, TaskManagerError};
pub use task::{
    SubmitOptions, TaskCallback, TaskCounts, TaskFailure, TaskOutput, TaskSnapshot, TaskStatus,
};
