//! # Resilience Module
//!
//! Fault isolation for the external services the pipeline depends on (LLM
//! gateways, image generation, publishing APIs). A per-service circuit
//! breaker stops calling a failing dependency for a cooldown window instead
//! of letting failures cascade through a generation run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scribe_core::config::CircuitBreakerConfig;
//! use scribe_core::resilience::CircuitBreaker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("llm_gateway", CircuitBreakerConfig::default());
//!
//! let result = breaker
//!     .call(|| async {
//!         // outbound call here
//!         Ok::<&str, std::io::Error>("generated")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod metrics;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use metrics::CircuitBreakerMetrics;
pub use registry::CircuitBreakerRegistry;
