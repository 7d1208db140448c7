//! Bounded LRU + TTL caches for resolver off-loading
//!
//! Four independently sized cache classes keep metadata and link lookups off
//! the remote store's hot path. The bounds cap worst-case memory under high
//! request fan-out, not correctness: a miss always falls through to the
//! authoritative resolver, and a stale entry simply expires by TTL.

use crate::config::CacheClassConfig;
use crate::models::{ObjectInfo, StreamLinks};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum time between passive expiry sweeps triggered by `set`
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

/// Statistics for one cache class
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    last_cleanup: Instant,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A bounded LRU map with a fixed TTL per entry.
///
/// Expiry is lazy (checked on `get`) plus a passive sweep rate-limited to
/// once per five minutes, triggered opportunistically from `set`.
pub struct TtlLruCache<V> {
    inner: Mutex<CacheInner<V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<V: Clone> TtlLruCache<V> {
    /// Create a cache with the given entry bound and TTL
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        TtlLruCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_entries,
            ttl,
        }
    }

    pub fn from_config(config: CacheClassConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    /// Look up a key. Expired entries are evicted and reported as a miss;
    /// hits are promoted to most-recently-used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let expired = inner
            .entries
            .get(key)
            .map(|entry| now.duration_since(entry.inserted_at) > self.ttl);

        match expired {
            None => {
                inner.misses += 1;
                None
            }
            Some(true) => {
                inner.entries.remove(key);
                inner.misses += 1;
                debug!("Cache entry expired: {}", key);
                None
            }
            Some(false) => {
                inner.hits += 1;
                let entry = inner.entries.get_mut(key).unwrap();
                entry.last_accessed = now;
                entry.access_count += 1;
                Some(entry.value.clone())
            }
        }
    }

    /// Insert or overwrite a key, evicting least-recently-used entries while
    /// over the configured bound
    pub fn set(&self, key: impl Into<String>, value: V) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        inner.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
                access_count: 0,
            },
        );

        while inner.entries.len() > self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                    inner.evictions += 1;
                    debug!("Evicted LRU cache entry: {}", k);
                }
                None => break,
            }
        }

        if now.duration_since(inner.last_cleanup) > CLEANUP_INTERVAL {
            let ttl = self.ttl;
            let before = inner.entries.len();
            inner
                .entries
                .retain(|_, e| now.duration_since(e.inserted_at) <= ttl);
            let removed = before - inner.entries.len();
            if removed > 0 {
                debug!("Passive cleanup removed {} expired entries", removed);
            }
            inner.last_cleanup = now;
        }
    }

    /// Remove one key, if present
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

/// All cache classes the gateway maintains, constructed once per process and
/// passed to request handlers (no hidden global singletons)
pub struct CacheRegistry {
    /// Object metadata keyed by decimal locator
    pub metadata: TtlLruCache<ObjectInfo>,
    /// Generated links keyed by decimal locator
    pub links: TtlLruCache<StreamLinks>,
    /// User preferences keyed by user id
    pub user_prefs: TtlLruCache<serde_json::Value>,
    /// Short-lived session tokens keyed by token id
    pub session_tokens: TtlLruCache<String>,
}

/// Per-class statistics, exposed on the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub metadata: CacheStats,
    pub links: CacheStats,
    pub user_prefs: CacheStats,
    pub session_tokens: CacheStats,
}

impl CacheRegistry {
    pub fn new(
        metadata: CacheClassConfig,
        links: CacheClassConfig,
        user_prefs: CacheClassConfig,
        session_tokens: CacheClassConfig,
    ) -> Self {
        CacheRegistry {
            metadata: TtlLruCache::from_config(metadata),
            links: TtlLruCache::from_config(links),
            user_prefs: TtlLruCache::from_config(user_prefs),
            session_tokens: TtlLruCache::from_config(session_tokens),
        }
    }

    /// Build the registry from the gateway configuration
    pub fn from_config(config: &crate::config::GatewayConfig) -> Self {
        Self::new(
            config.metadata_cache,
            config.link_cache,
            config.user_cache,
            config.session_cache,
        )
    }

    /// Drop metadata and link entries for one object (administrative)
    pub fn invalidate_object(&self, locator: u64) {
        let key = locator.to_string();
        self.metadata.invalidate(&key);
        self.links.invalidate(&key);
    }

    /// Clear every cache class (administrative)
    pub fn clear_all(&self) {
        self.metadata.clear();
        self.links.clear();
        self.user_prefs.clear();
        self.session_tokens.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            metadata: self.metadata.stats(),
            links: self.links.stats(),
            user_prefs: self.user_prefs.stats(),
            session_tokens: self.session_tokens.stats(),
        }
    }
}
