//! Per-service circuit breaker registry.

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::metrics::CircuitBreakerMetrics;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Get-or-create registry of breakers keyed by service name. Owned by the
/// component that makes the protected calls (the HTTP pool manager here);
/// no process-global state.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Fetch the breaker for a service, creating it with the default
    /// configuration on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                debug!(service = %service, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    service.to_string(),
                    self.default_config.clone(),
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub async fn all_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.clone()).collect();
        let mut metrics = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            metrics.push(breaker.metrics().await);
        }
        metrics
    }
}
