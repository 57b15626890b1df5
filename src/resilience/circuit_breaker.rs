//! # Circuit Breaker Implementation
//!
//! Failure gate in front of an unreliable dependency, following the classic
//! three-state pattern: Closed (normal operation), Open (failing fast), and
//! HalfOpen (probing recovery). After `failure_threshold` consecutive
//! failures the circuit opens; once `open_timeout` elapses it admits exactly
//! `trial_calls` probe calls, closing again on probe success and reopening
//! immediately on probe failure.

use crate::config::CircuitBreakerConfig;
use crate::resilience::metrics::{average_duration, CircuitBreakerMetrics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Operational mode of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Failing fast, calls are rejected without executing
    Open,
    /// Probing recovery with a limited number of trial calls
    HalfOpen,
}

/// Errors produced by a protected call.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was never invoked.
    #[error("circuit breaker is open for {service}")]
    Open { service: String },

    /// The operation ran and failed; the failure was recorded.
    #[error("operation failed: {0}")]
    Operation(E),
}

struct CircuitCell {
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    probes_admitted: u32,
    probe_successes: u32,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
    total_call_duration: Duration,
}

/// Per-service failure gate.
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    cell: Mutex<CircuitCell>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let service = service.into();
        info!(
            service = %service,
            failure_threshold = config.failure_threshold,
            open_timeout_secs = config.open_timeout_secs,
            trial_calls = config.trial_calls,
            "🛡️ Circuit breaker initialized"
        );
        Self {
            service,
            config,
            cell: Mutex::new(CircuitCell {
                state: CircuitState::Closed,
                opened_at: None,
                consecutive_failures: 0,
                probes_admitted: 0,
                probe_successes: 0,
                total_calls: 0,
                success_count: 0,
                failure_count: 0,
                rejected_count: 0,
                total_call_duration: Duration::ZERO,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn state(&self) -> CircuitState {
        self.cell.lock().await.state
    }

    /// Execute an operation behind the circuit. Rejected calls fail with
    /// [`CircuitBreakerError::Open`] without invoking the operation.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_admit().await {
            return Err(CircuitBreakerError::Open {
                service: self.service.clone(),
            });
        }

        let started = Instant::now();
        let result = operation().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => self.record_success(elapsed).await,
            Err(_) => self.record_failure(elapsed).await,
        }

        result.map_err(CircuitBreakerError::Operation)
    }

    /// Decide whether a call may proceed, driving the Open → HalfOpen
    /// transition once the cooldown has elapsed.
    async fn try_admit(&self) -> bool {
        let mut cell = self.cell.lock().await;
        match cell.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = cell
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout())
                    .unwrap_or(true);
                if cooled_down {
                    cell.state = CircuitState::HalfOpen;
                    cell.probes_admitted = 1;
                    cell.probe_successes = 0;
                    info!(
                        service = %self.service,
                        trial_calls = self.config.trial_calls,
                        "🟡 Circuit breaker half-open (probing recovery)"
                    );
                    true
                } else {
                    cell.rejected_count += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if cell.probes_admitted < self.config.trial_calls {
                    cell.probes_admitted += 1;
                    true
                } else {
                    cell.rejected_count += 1;
                    false
                }
            }
        }
    }

    async fn record_success(&self, elapsed: Duration) {
        let mut cell = self.cell.lock().await;
        cell.total_calls += 1;
        cell.success_count += 1;
        cell.total_call_duration += elapsed;

        debug!(
            service = %self.service,
            duration_ms = elapsed.as_millis(),
            "🟢 Protected call succeeded"
        );

        match cell.state {
            CircuitState::Closed => {
                cell.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                cell.probe_successes += 1;
                if cell.probe_successes >= self.config.trial_calls {
                    close_circuit(&mut cell, &self.service);
                }
            }
            CircuitState::Open => {
                warn!(service = %self.service, "Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self, elapsed: Duration) {
        let mut cell = self.cell.lock().await;
        cell.total_calls += 1;
        cell.failure_count += 1;
        cell.total_call_duration += elapsed;

        error!(
            service = %self.service,
            duration_ms = elapsed.as_millis(),
            "🔴 Protected call failed"
        );

        match cell.state {
            CircuitState::Closed => {
                cell.consecutive_failures += 1;
                if cell.consecutive_failures >= self.config.failure_threshold {
                    open_circuit(&mut cell, &self.service, self.config.open_timeout_secs);
                }
            }
            // Any probe failure reopens immediately
            CircuitState::HalfOpen => {
                open_circuit(&mut cell, &self.service, self.config.open_timeout_secs);
            }
            CircuitState::Open => {}
        }
    }

    /// Operator override: fail fast regardless of recent history.
    pub async fn force_open(&self) {
        warn!(service = %self.service, "Circuit breaker forced open");
        let mut cell = self.cell.lock().await;
        open_circuit(&mut cell, &self.service, self.config.open_timeout_secs);
    }

    /// Operator override: resume normal operation.
    pub async fn force_close(&self) {
        warn!(service = %self.service, "Circuit breaker forced closed");
        let mut cell = self.cell.lock().await;
        close_circuit(&mut cell, &self.service);
    }

    /// Current metrics snapshot.
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let cell = self.cell.lock().await;
        let failure_rate = if cell.total_calls > 0 {
            cell.failure_count as f64 / cell.total_calls as f64
        } else {
            0.0
        };
        let average_call_duration = average_duration(cell.total_call_duration, cell.total_calls);
        CircuitBreakerMetrics {
            service: self.service.clone(),
            state: cell.state,
            total_calls: cell.total_calls,
            success_count: cell.success_count,
            failure_count: cell.failure_count,
            rejected_count: cell.rejected_count,
            consecutive_failures: cell.consecutive_failures,
            failure_rate,
            average_call_duration,
        }
    }
}

fn open_circuit(cell: &mut CircuitCell, service: &str, timeout_secs: u64) {
    cell.state = CircuitState::Open;
    cell.opened_at = Some(Instant::now());
    cell.probes_admitted = 0;
    cell.probe_successes = 0;
    error!(
        service = %service,
        consecutive_failures = cell.consecutive_failures,
        open_timeout_secs = timeout_secs,
        "🔴 Circuit breaker opened (failing fast)"
    );
}

fn close_circuit(cell: &mut CircuitCell, service: &str) {
    cell.state = CircuitState::Closed;
    cell.opened_at = None;
    cell.consecutive_failures = 0;
    cell.probes_admitted = 0;
    cell.probe_successes = 0;
    info!(service = %service, "🟢 Circuit breaker closed (recovered)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn config(threshold: u32, timeout_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            open_timeout_secs: timeout_secs,
            trial_calls: 1,
        }
    }

    #[tokio::test]
    async fn successful_calls_keep_circuit_closed() {
        let breaker = CircuitBreaker::new("llm_api", config(3, 1));

        let result = breaker.call(|| async { Ok::<_, String>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, CircuitState::Closed);

        let metrics = breaker.metrics().await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("llm_api", config(2, 30));

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        // Fail fast without invoking the operation
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result = breaker
            .call(|| async {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>("unreachable")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_count() {
        let breaker = CircuitBreaker::new("llm_api", config(2, 30));

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        let _ = breaker.call(|| async { Ok::<_, String>("ok") }).await;
        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn recovers_through_half_open_probe() {
        let breaker = CircuitBreaker::new(
            "llm_api",
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_timeout_secs: 0,
                trial_calls: 1,
            },
        );

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        sleep(Duration::from_millis(10)).await;

        // Cooldown elapsed: the probe is admitted and closes the circuit
        let result = breaker.call(|| async { Ok::<_, String>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(
            "llm_api",
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_timeout_secs: 0,
                trial_calls: 1,
            },
        );

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        sleep(Duration::from_millis(10)).await;

        let _ = breaker.call(|| async { Err::<(), _>("still down") }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn force_overrides() {
        let breaker = CircuitBreaker::new("llm_api", config(5, 30));

        breaker.force_open().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        breaker.force_close().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
