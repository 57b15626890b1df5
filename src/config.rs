//! # Typed Component Configuration
//!
//! Every subsystem takes an explicit, validated configuration struct at
//! construction time. Defaults mirror the values the content pipeline has
//! been tuned with in production; `CoreConfig::load` layers an optional TOML
//! file and `SCRIBE__`-prefixed environment variables on top of them.

use crate::error::{Result, ScribeError};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the bounded async task manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Maximum number of task executions in flight at once.
    pub max_workers: usize,
    /// Capacity of the pending-task queue. Submissions beyond this fail
    /// with a capacity error rather than dropping silently.
    pub max_concurrent_tasks: usize,
    /// Poll interval for `wait_for_task`, in milliseconds.
    pub wait_poll_interval_ms: u64,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_concurrent_tasks: 50,
            wait_poll_interval_ms: 50,
        }
    }
}

impl TaskManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ScribeError::ConfigurationError(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ScribeError::ConfigurationError(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }
        if self.wait_poll_interval_ms == 0 {
            return Err(ScribeError::ConfigurationError(
                "wait_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }
}

/// Configuration for the pooled HTTP transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpPoolConfig {
    pub total_connections: usize,
    pub per_host_connections: usize,
    pub connection_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub enable_compression: bool,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Response cache settings; `None` disables caching entirely.
    pub cache: Option<CacheConfig>,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            total_connections: 100,
            per_host_connections: 30,
            connection_timeout_secs: 30,
            read_timeout_secs: 60,
            enable_compression: true,
            max_redirects: 10,
            user_agent: format!("scribe-core/{}", env!("CARGO_PKG_VERSION")),
            cache: Some(CacheConfig::default()),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl HttpPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_connections == 0 {
            return Err(ScribeError::ConfigurationError(
                "total_connections must be greater than 0".to_string(),
            ));
        }
        if self.per_host_connections == 0 {
            return Err(ScribeError::ConfigurationError(
                "per_host_connections must be greater than 0".to_string(),
            ));
        }
        if self.per_host_connections > self.total_connections {
            return Err(ScribeError::ConfigurationError(format!(
                "per_host_connections ({}) exceeds total_connections ({})",
                self.per_host_connections, self.total_connections
            )));
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        self.circuit_breaker.validate()
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// TTL response cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 512,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ScribeError::ConfigurationError(
                "cache max_entries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-service circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker fails fast before probing, in seconds.
    pub open_timeout_secs: u64,
    /// Probe calls admitted in half-open state before closing.
    pub trial_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 30,
            trial_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(ScribeError::ConfigurationError(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.trial_calls == 0 {
            return Err(ScribeError::ConfigurationError(
                "trial_calls must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

/// Byte buffer pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Size in bytes of every pooled buffer.
    pub chunk_size: usize,
    /// Maximum number of idle buffers retained.
    pub max_chunks: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            max_chunks: 8,
        }
    }
}

impl BufferPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ScribeError::ConfigurationError(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Content pipeline processor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum number of workflows generating content at once.
    pub max_concurrency: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { max_concurrency: 2 }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ScribeError::ConfigurationError(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resource growth monitor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceMonitorConfig {
    pub sample_interval_secs: u64,
    /// Fractional growth between samples that flags a resource kind,
    /// e.g. 0.5 flags anything that grew by more than 50%.
    pub growth_threshold: f64,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 30,
            growth_threshold: 0.5,
        }
    }
}

impl ResourceMonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_secs == 0 {
            return Err(ScribeError::ConfigurationError(
                "sample_interval_secs must be greater than 0".to_string(),
            ));
        }
        if !self.growth_threshold.is_finite() || self.growth_threshold <= 0.0 {
            return Err(ScribeError::ConfigurationError(
                "growth_threshold must be a positive finite number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

/// Aggregate configuration for every subsystem in the crate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub tasks: TaskManagerConfig,
    pub http: HttpPoolConfig,
    pub buffers: BufferPoolConfig,
    pub processor: ProcessorConfig,
    pub resources: ResourceMonitorConfig,
}

impl CoreConfig {
    /// Load configuration from an optional TOML file plus environment
    /// overrides (`SCRIBE__TASKS__MAX_WORKERS=4` style), then validate
    /// every section.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SCRIBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ScribeError::ConfigurationError(e.to_string()))?;

        let loaded: CoreConfig = settings
            .try_deserialize()
            .map_err(|e| ScribeError::ConfigurationError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        self.tasks.validate()?;
        self.http.validate()?;
        self.buffers.validate()?;
        self.processor.validate()?;
        self.resources.validate()
    }
}
