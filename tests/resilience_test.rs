//! Circuit breaker and response cache behavior under failing dependencies.

use scribe_core::config::{CacheConfig, CircuitBreakerConfig};
use scribe_core::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use scribe_core::transport::{cache_key, ResponseCache};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn breaker(threshold: u32, open_timeout_secs: u64) -> CircuitBreaker {
    CircuitBreaker::new(
        "llm_api",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            open_timeout_secs,
            trial_calls: 1,
        },
    )
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures_and_recovers() {
    let breaker = breaker(3, 1);
    let invocations = AtomicUsize::new(0);

    for _ in 0..3 {
        let result = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("upstream 503")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Operation(_))));
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    // Open circuit fails fast without touching the dependency
    let rejected = breaker
        .call(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(matches!(rejected, Err(CircuitBreakerError::Open { .. })));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // After the cooldown a single successful trial closes the circuit
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let recovered = breaker
        .call(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>("probe")
        })
        .await;
    assert!(recovered.is_ok());
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(invocations.load(Ordering::SeqCst), 4);

    let metrics = breaker.metrics().await;
    assert_eq!(metrics.failure_count, 3);
    assert_eq!(metrics.rejected_count, 1);
}

#[tokio::test]
async fn half_open_admits_exactly_one_probe() {
    let breaker = breaker(1, 1);

    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
    assert_eq!(breaker.state().await, CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Two concurrent calls race for the single trial slot
    let slow_probe = breaker.call(|| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, &str>("probe")
    });
    let second = breaker.call(|| async { Ok::<_, &str>("extra") });

    let (probe_result, second_result) = tokio::join!(slow_probe, second);
    let results = [&probe_result, &second_result];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(CircuitBreakerError::Open { .. })))
        .count();
    assert_eq!(admitted, 1, "exactly one trial call may run");
    assert_eq!(rejected, 1, "the surplus call is rejected");
}

#[tokio::test]
async fn failed_probe_reopens_the_circuit() {
    let breaker = breaker(1, 1);

    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let probe = breaker.call(|| async { Err::<(), _>("still down") }).await;
    assert!(matches!(probe, Err(CircuitBreakerError::Operation(_))));
    assert_eq!(breaker.state().await, CircuitState::Open);
}

#[tokio::test]
async fn cache_absorbs_repeat_lookups_until_ttl_expires() {
    let cache = ResponseCache::new(&CacheConfig {
        ttl_secs: 1,
        max_entries: 32,
    });
    let loads = AtomicUsize::new(0);

    let key = cache_key(
        "GET",
        "https://api.example.com/v1/topics",
        &[("lang", "en")],
        &[],
        None,
    );

    // Miss, load, insert; a hit skips the load entirely
    async fn fetch(cache: &ResponseCache, key: &str, loads: &AtomicUsize) -> Value {
        if let Some(hit) = cache.get(key).await {
            return hit;
        }
        loads.fetch_add(1, Ordering::SeqCst);
        let body = json!({"topics": ["rust"]});
        cache.insert(key.to_string(), body.clone()).await;
        body
    }

    let first = fetch(&cache, &key, &loads).await;
    let second = fetch(&cache, &key, &loads).await;
    assert_eq!(first, second);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    fetch(&cache, &key, &loads).await;
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    let (hits, misses) = cache.hit_counts().await;
    assert_eq!(hits, 1);
    assert_eq!(misses, 2);
}

#[test]
fn equivalent_requests_share_a_cache_key() {
    let a = cache_key(
        "get",
        "https://api.example.com/v1/topics",
        &[("b", "2"), ("a", "1")],
        &[("Accept", "application/json")],
        None,
    );
    let b = cache_key(
        "GET",
        "https://api.example.com/v1/topics?a=1",
        &[("b", "2")],
        &[
            ("accept", "application/json"),
            ("Authorization", "Bearer secret"),
        ],
        None,
    );
    assert_eq!(a, b);
}
