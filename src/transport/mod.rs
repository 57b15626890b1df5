//! # Transport Module
//!
//! Pooled outbound HTTP with response caching and circuit breaking. The
//! content pipeline routes every LLM, image, and publishing call through
//! one [`HttpPoolManager`] so connection reuse, timeouts, cache TTLs, and
//! failure isolation are enforced in a single place.

pub mod cache;
pub mod pool;

pub use cache::{cache_key, ResponseCache};
pub use pool::{HttpPoolError, HttpPoolManager, RequestStats};
