//! # Pooled HTTP Transport
//!
//! One shared `reqwest::Client` with bounded per-host connection reuse,
//! connect/read timeouts, optional compression, and bounded redirects. GET
//! responses flow through the TTL response cache (a hit short-circuits both
//! the network call and the circuit breaker); every live call goes through
//! the named service's circuit breaker.

use crate::config::HttpPoolConfig;
use crate::resilience::metrics::average_duration;
use crate::resilience::{CircuitBreakerError, CircuitBreakerMetrics, CircuitBreakerRegistry};
use crate::transport::cache::{cache_key, ResponseCache};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Errors surfaced by the HTTP pool.
#[derive(Debug, thiserror::Error)]
pub enum HttpPoolError {
    #[error("invalid transport configuration: {0}")]
    Configuration(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status} for {url}")]
    Status {
        service: String,
        url: String,
        status: u16,
    },

    #[error("non-JSON response from {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The named service's breaker is open; no request was sent.
    #[error("circuit breaker is open for {service}")]
    CircuitOpen { service: String },
}

/// Cumulative request statistics for the pool.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub total_time: Duration,
    pub avg_response_time: Duration,
}

impl RequestStats {
    fn record(&mut self, success: bool, cached: bool, elapsed: Duration) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        if cached {
            self.cached_requests += 1;
        }
        self.total_time += elapsed;
        self.avg_response_time = average_duration(self.total_time, self.total_requests);
    }
}

/// Pooled HTTP client with response caching and per-service circuit
/// breaking. Construct once at process start and inject wherever outbound
/// calls are made.
pub struct HttpPoolManager {
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    breakers: CircuitBreakerRegistry,
    stats: parking_lot::Mutex<RequestStats>,
    config: HttpPoolConfig,
}

impl HttpPoolManager {
    pub fn new(config: HttpPoolConfig) -> Result<Self, HttpPoolError> {
        config
            .validate()
            .map_err(|e| HttpPoolError::Configuration(e.to_string()))?;

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.per_host_connections)
            .connect_timeout(config.connection_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.connection_timeout() + config.read_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone());
        if !config.enable_compression {
            builder = builder.no_gzip();
        }
        let client = builder.build().map_err(HttpPoolError::ClientBuild)?;

        let cache = config.cache.as_ref().map(ResponseCache::new);
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone());

        info!(
            per_host_connections = config.per_host_connections,
            connection_timeout_secs = config.connection_timeout_secs,
            read_timeout_secs = config.read_timeout_secs,
            caching = cache.is_some(),
            "HTTP pool manager initialized"
        );

        Ok(Self {
            client,
            cache,
            breakers,
            stats: parking_lot::Mutex::new(RequestStats::default()),
            config,
        })
    }

    /// GET a JSON document. Identical requests within the cache TTL are
    /// served from the cache without touching the network or the breaker;
    /// only 2xx JSON responses are cached.
    pub async fn get_json(
        &self,
        service: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, HttpPoolError> {
        let key = cache_key("GET", url, params, &[], None);

        if let Some(cache) = &self.cache {
            if let Some(payload) = cache.get(&key).await {
                self.stats.lock().record(true, true, Duration::ZERO);
                debug!(service = %service, url = %url, "Served from response cache");
                return Ok(payload);
            }
        }

        let started = Instant::now();
        let breaker = self.breakers.breaker(service);
        let outcome = breaker
            .call(|| async {
                let response = self
                    .client
                    .get(url)
                    .query(params)
                    .send()
                    .await
                    .map_err(|source| HttpPoolError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(HttpPoolError::Status {
                        service: service.to_string(),
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|source| HttpPoolError::InvalidJson {
                        url: url.to_string(),
                        source,
                    })
            })
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(payload) => {
                if let Some(cache) = &self.cache {
                    cache.insert(key, payload.clone()).await;
                }
                self.stats.lock().record(true, false, elapsed);
                Ok(payload)
            }
            Err(error) => {
                self.stats.lock().record(false, false, elapsed);
                Err(flatten_breaker_error(error))
            }
        }
    }

    /// POST a JSON body and parse the JSON response. Never cached.
    pub async fn post_json(
        &self,
        service: &str,
        url: &str,
        body: &Value,
    ) -> Result<Value, HttpPoolError> {
        let started = Instant::now();
        let breaker = self.breakers.breaker(service);
        let outcome = breaker
            .call(|| async {
                let response = self
                    .client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|source| HttpPoolError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(HttpPoolError::Status {
                        service: service.to_string(),
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|source| HttpPoolError::InvalidJson {
                        url: url.to_string(),
                        source,
                    })
            })
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(payload) => {
                self.stats.lock().record(true, false, elapsed);
                Ok(payload)
            }
            Err(error) => {
                self.stats.lock().record(false, false, elapsed);
                Err(flatten_breaker_error(error))
            }
        }
    }

    pub fn stats(&self) -> RequestStats {
        self.stats.lock().clone()
    }

    pub async fn breaker_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        self.breakers.all_metrics().await
    }

    pub fn config(&self) -> &HttpPoolConfig {
        &self.config
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }

    /// Remove expired cache entries; intended to run periodically.
    pub async fn cleanup_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.cleanup_expired().await,
            None => 0,
        }
    }
}

fn flatten_breaker_error(error: CircuitBreakerError<HttpPoolError>) -> HttpPoolError {
    match error {
        CircuitBreakerError::Open { service } => {
            warn!(service = %service, "Request rejected by open circuit breaker");
            HttpPoolError::CircuitOpen { service }
        }
        CircuitBreakerError::Operation(inner) => inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn builds_client_from_valid_config() {
        let pool = HttpPoolManager::new(HttpPoolConfig::default()).unwrap();
        assert_eq!(pool.stats().total_requests, 0);
        assert!(pool.breaker_metrics().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = HttpPoolConfig {
            per_host_connections: 0,
            ..HttpPoolConfig::default()
        };
        assert!(matches!(
            HttpPoolManager::new(config),
            Err(HttpPoolError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_network() {
        let config = HttpPoolConfig {
            cache: Some(CacheConfig::default()),
            ..HttpPoolConfig::default()
        };
        let pool = HttpPoolManager::new(config).unwrap();

        let breaker = pool.breakers.breaker("dead_service");
        breaker.force_open().await;

        let err = pool
            .get_json("dead_service", "http://192.0.2.1/api", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HttpPoolError::CircuitOpen { .. }));
        assert_eq!(pool.stats().failed_requests, 1);
    }

    #[test]
    fn stats_average_tracks_total() {
        let mut stats = RequestStats::default();
        stats.record(true, false, Duration::from_millis(100));
        stats.record(false, false, Duration::from_millis(300));
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.avg_response_time, Duration::from_millis(200));
    }
}
