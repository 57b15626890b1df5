//! # Memory Management Module
//!
//! Bounds the memory footprint of long generation sessions: a fixed-size
//! byte buffer pool for large payloads, head/tail compaction for oversized
//! model outputs, and RAII resource tracking that surfaces slow handle
//! leaks without any runtime object-graph scanning.

pub mod buffer_pool;
pub mod text;
pub mod tracker;

pub use buffer_pool::{ByteBufferPool, PooledBuffer};
pub use text::{normalize_large_text, COMPACTION_MARKER};
pub use tracker::{ResourceGrowth, ResourceMonitorHandle, ResourceTracker, TrackedResource};
