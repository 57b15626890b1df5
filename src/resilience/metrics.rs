//! Circuit breaker metrics snapshots.

use crate::resilience::circuit_breaker::CircuitState;
use serde::Serialize;
use std::time::Duration;

/// Point-in-time view of one breaker's call history.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub service: String,
    pub state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls rejected without execution while open or probing.
    pub rejected_count: u64,
    pub consecutive_failures: u32,
    pub failure_rate: f64,
    pub average_call_duration: Duration,
}

/// Average duration over `count` events, exact for counts past `u32::MAX`.
pub(crate) fn average_duration(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

impl CircuitBreakerMetrics {
    /// Closed with a failure rate under 10% counts as healthy; breakers
    /// with fewer than 10 calls have too little history to judge.
    pub fn is_healthy(&self) -> bool {
        if self.state != CircuitState::Closed {
            return false;
        }
        if self.total_calls < 10 {
            return true;
        }
        self.failure_rate < 0.1
    }
}
