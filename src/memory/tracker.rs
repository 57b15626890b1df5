//! Scoped resource tracking with growth detection.
//!
//! Replaces runtime object-graph scanning with ownership: every interesting
//! resource (open connection, worker handle, queue, buffer) registers a
//! [`TrackedResource`] guard on acquisition; dropping the guard deregisters
//! it. The tracker compares live counts between samples and flags kinds
//! whose population grew past the configured threshold, which is how slow
//! handle leaks in long-running generation sessions get noticed.

use crate::config::ResourceMonitorConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct TrackerShared {
    live: DashMap<String, AtomicUsize>,
    previous_sample: parking_lot::Mutex<HashMap<String, usize>>,
}

/// A resource kind whose live count grew past the threshold between
/// samples.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceGrowth {
    pub kind: String,
    pub previous: usize,
    pub current: usize,
    /// Fractional growth, e.g. 0.75 for 75% more live guards.
    pub growth: f64,
}

/// Tracks live resource guards by kind. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResourceTracker {
    shared: Arc<TrackerShared>,
    config: ResourceMonitorConfig,
}

impl ResourceTracker {
    pub fn new(config: ResourceMonitorConfig) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(TrackerShared {
                live: DashMap::new(),
                previous_sample: parking_lot::Mutex::new(HashMap::new()),
            }),
            config,
        })
    }

    /// Register a live resource. Hold the guard for the resource's
    /// lifetime; dropping it deregisters the resource.
    pub fn track(&self, kind: impl Into<String>) -> TrackedResource {
        let kind = kind.into();
        self.shared
            .live
            .entry(kind.clone())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::AcqRel);
        TrackedResource {
            kind,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current live count per kind.
    pub fn live_counts(&self) -> HashMap<String, usize> {
        self.shared
            .live
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect()
    }

    /// Compare live counts against the previous sample and flag kinds whose
    /// population grew past the threshold. Updates the baseline.
    pub fn sample(&self) -> Vec<ResourceGrowth> {
        let current = self.live_counts();
        let mut previous = self.shared.previous_sample.lock();

        let mut flagged = Vec::new();
        for (kind, &count) in &current {
            let Some(&baseline) = previous.get(kind) else {
                continue;
            };
            if baseline == 0 || count <= baseline {
                continue;
            }
            let growth = (count - baseline) as f64 / baseline as f64;
            if growth > self.config.growth_threshold {
                flagged.push(ResourceGrowth {
                    kind: kind.clone(),
                    previous: baseline,
                    current: count,
                    growth,
                });
            }
        }

        *previous = current;
        flagged
    }

    /// Spawn a background task that samples periodically and logs flagged
    /// growth. Returns a handle used to stop the monitor at shutdown.
    pub fn spawn_monitor(&self) -> ResourceMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let tracker = self.clone();
        let interval = self.config.sample_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for growth in tracker.sample() {
                            warn!(
                                kind = %growth.kind,
                                previous = growth.previous,
                                current = growth.current,
                                growth_pct = format!("{:.0}%", growth.growth * 100.0),
                                "Resource count growing between samples"
                            );
                        }
                        debug!("Resource sample complete");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Resource monitor stopped");
        });

        info!(
            interval_secs = self.config.sample_interval_secs,
            "Resource monitor started"
        );
        ResourceMonitorHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to the background sampling task.
pub struct ResourceMonitorHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ResourceMonitorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// RAII guard for one live resource; dropping it deregisters the resource.
pub struct TrackedResource {
    kind: String,
    shared: Arc<TrackerShared>,
}

impl TrackedResource {
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Drop for TrackedResource {
    fn drop(&mut self) {
        if let Some(counter) = self.shared.live.get(&self.kind) {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
