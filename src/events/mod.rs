//! # Pipeline Event Stream
//!
//! Typed lifecycle events published over a broadcast channel. The web layer
//! and the parent-process log bridge subscribe here to stream structured
//! `{type, message, timestamp, level}` messages to their clients.

pub mod publisher;
pub mod types;

pub use publisher::EventPublisher;
pub use types::{EventLevel, PipelineEvent};
