//! TTL response cache with capacity-bounded oldest-first eviction.

use crate::config::CacheConfig;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Build a cache key from the parts of a request that affect its response:
/// method, canonicalized URL, sorted query params, the response-relevant
/// headers, and a hash of the payload for bodied requests. Query params
/// embedded in the URL and params passed separately key identically.
pub fn cache_key(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> String {
    let mut query: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let base = match url::Url::parse(url) {
        Ok(parsed) => {
            query.extend(
                parsed
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
            let mut base = parsed.clone();
            base.set_query(None);
            base.set_fragment(None);
            base.to_string()
        }
        // Unparseable URLs still key deterministically
        Err(_) => url.to_string(),
    };

    let mut parts: Vec<String> = vec![method.to_uppercase(), base];

    if !query.is_empty() {
        query.sort_unstable();
        parts.push(
            query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
        );
    }

    // Only headers that change the representation of the response
    let mut relevant: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            lower == "accept" || lower == "content-type"
        })
        .map(|(name, value)| (name.to_ascii_lowercase(), *value))
        .collect();
    if !relevant.is_empty() {
        relevant.sort_unstable();
        parts.push(
            relevant
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect::<Vec<_>>()
                .join(";"),
        );
    }

    if let Some(body) = body {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        parts.push(format!("{:016x}", hasher.finish()));
    }

    parts.join("|")
}

struct CacheEntry {
    payload: Value,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// In-memory TTL cache for JSON responses. Entries never outlive the TTL;
/// when the cache is full the oldest insertion is evicted first. Racing
/// writers for the same key follow last-writer-wins.
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a cached payload, removing it if the TTL has elapsed.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let fresh = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < self.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if fresh {
            inner.hits += 1;
            debug!(key = %key, "Response cache hit");
            inner.entries.get(key).map(|entry| entry.payload.clone())
        } else {
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
            inner.misses += 1;
            None
        }
    }

    /// Store a payload, evicting the oldest insertions once full.
    pub async fn insert(&self, key: String, payload: Value) {
        let mut inner = self.inner.lock().await;

        if inner.entries.contains_key(&key) {
            inner.insertion_order.retain(|k| k != &key);
        }
        inner.insertion_order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );

        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!(key = %oldest, "Evicted oldest cache entry");
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        let entries = &inner.entries;
        inner
            .insertion_order
            .retain(|key| entries.contains_key(key));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, "Cleaned up expired cache entries");
        }
        removed
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.insertion_order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// (hits, misses) counters since construction.
    pub async fn hit_counts(&self) -> (u64, u64) {
        let inner = self.inner.lock().await;
        (inner.hits, inner.misses)
    }
}
