//! # Pipeline Module
//!
//! Semaphore-bounded admission for content-generation workflows, with the
//! generation engine itself behind a trait seam.

pub mod processor;

pub use processor::{
    ContentProcessor, ProcessorError, WorkflowEngine, WorkflowOutcome, WorkflowRequest,
};
