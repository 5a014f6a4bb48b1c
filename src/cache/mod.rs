// =============================================================================
// SPARQL Query Result Cache
// =============================================================================
// Bounded, TTL-expiring store for formatted query results, parameterized by a
// pluggable eviction policy and tracking hit/miss/eviction statistics.

pub mod policy;

pub use policy::{CacheStrategy, EvictionPolicy, FifoPolicy, LfuPolicy, LruPolicy};

use crate::error::QueryServerError;
use crate::model::CacheStatsSnapshot;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque digest identifying one (query text, format) pair.
///
/// Equal inputs always produce equal keys; the same query requested in two
/// formats produces two distinct keys. ahash is sufficient here because the
/// key is a cache discriminator, not a security boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Derive the key for a query in a given output format.
    ///
    /// The query text is whitespace-normalized first so trivial reformatting
    /// of the same query shares one entry.
    pub fn for_query(query: &str, format_token: &str) -> Self {
        let normalized = normalize_query(query);
        let mut hasher = ahash::AHasher::default();
        normalized.hash(&mut hasher);
        format_token.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Wrap a precomputed digest. Intended for tests and diagnostics.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Collapse runs of whitespace so formatting differences do not fragment the
/// cache.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache configuration, validated at construction time.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, the orchestrator never touches the cache.
    pub enabled: bool,
    /// Capacity bound enforced by eviction.
    pub max_size: usize,
    /// Entry lifetime in seconds; 0 disables expiry.
    pub ttl_secs: i64,
    /// Replacement strategy.
    pub strategy: CacheStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            ttl_secs: 300,
            strategy: CacheStrategy::Lru,
        }
    }
}

impl CacheConfig {
    /// Reject configurations the cache cannot honor. Misconfiguration is
    /// fatal at startup, never reported at call time.
    pub fn validate(&self) -> Result<(), QueryServerError> {
        if self.ttl_secs < 0 {
            return Err(QueryServerError::InvalidConfiguration(format!(
                "cache_ttl must be >= 0, got {}",
                self.ttl_secs
            )));
        }
        if self.enabled && self.max_size == 0 {
            return Err(QueryServerError::InvalidConfiguration(
                "cache_max_size must be > 0 when caching is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl_secs: i64, now: DateTime<Utc>) -> bool {
        ttl_secs > 0 && now >= self.created_at + Duration::seconds(ttl_secs)
    }
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    policy: Box<dyn EvictionPolicy>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, time-expiring store for formatted query results.
///
/// A single coarse lock covers TTL checks, entry mutation, and policy
/// bookkeeping so eviction decisions never observe a torn intermediate
/// state. No operation blocks on I/O, so the lock is held only briefly.
///
/// Expiry is lazy: an expired entry stays physically resident (and counted
/// in `current_size`) until a `get` touches it, but is never returned to a
/// caller once its age reaches the TTL.
pub struct QueryCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl QueryCache {
    /// Build a cache from a validated configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for a negative TTL or a zero capacity
    /// with caching enabled.
    pub fn new(config: CacheConfig) -> Result<Self, QueryServerError> {
        config.validate()?;
        let policy = config.strategy.build();
        Ok(Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                policy,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a key, recording a hit or miss.
    ///
    /// An expired entry is removed and reported as a miss, not an eviction.
    pub fn get(&self, key: CacheKey) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    /// `get` with an explicit clock, used directly by tests.
    pub fn get_at(&self, key: CacheKey, now: DateTime<Utc>) -> Option<Value> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(&key) {
            Some(entry) => entry.is_expired(self.config.ttl_secs, now),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(&key);
            inner.policy.on_remove(key);
            inner.misses += 1;
            tracing::debug!(cache_key = %key, "cache entry expired");
            return None;
        }

        inner.hits += 1;
        inner.policy.on_access(key);
        let entry = inner
            .entries
            .get_mut(&key)
            .map(|entry| {
                entry.last_accessed_at = now;
                entry.access_count += 1;
                entry.value.clone()
            });
        entry
    }

    /// Insert or overwrite a value, evicting first if at capacity.
    pub fn put(&self, key: CacheKey, value: Value) {
        self.put_at(key, value, Utc::now());
    }

    /// `put` with an explicit clock, used directly by tests.
    pub fn put_at(&self, key: CacheKey, value: Value, now: DateTime<Utc>) {
        if self.config.max_size == 0 {
            return;
        }

        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&key) {
            // Overwrite resets the entry's lifetime and policy bookkeeping.
            inner.entries.insert(
                key,
                CacheEntry {
                    value,
                    created_at: now,
                    last_accessed_at: now,
                    access_count: 0,
                },
            );
            inner.policy.on_remove(key);
            inner.policy.on_insert(key);
            return;
        }

        if inner.entries.len() >= self.config.max_size {
            if let Some(victim) = inner.policy.select_victim() {
                inner.entries.remove(&victim);
                inner.policy.on_remove(victim);
                inner.evictions += 1;
                tracing::debug!(cache_key = %victim, "evicted cache entry");
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
        inner.policy.on_insert(key);
    }

    /// Drop all entries and zero every counter. Configuration is preserved,
    /// so the cache keeps its capacity, TTL, and strategy.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let keys: Vec<CacheKey> = inner.entries.keys().copied().collect();
        for key in keys {
            inner.policy.on_remove(key);
        }
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Point-in-time statistics snapshot.
    ///
    /// `current_size` counts physically resident entries; lazily expired
    /// entries still count until a `get` purges them.
    pub fn stats(&self) -> CacheStatsSnapshot {
        let inner = self.inner.lock();
        CacheStatsSnapshot {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            current_size: inner.entries.len(),
            max_size: self.config.max_size,
            strategy: inner.policy.name().to_string(),
        }
    }

    /// Number of physically resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(strategy: CacheStrategy, max_size: usize, ttl_secs: i64) -> QueryCache {
        QueryCache::new(CacheConfig {
            enabled: true,
            max_size,
            ttl_secs,
            strategy,
        })
        .expect("valid cache config")
    }

    #[test]
    fn key_is_deterministic_and_format_sensitive() {
        let a = CacheKey::for_query("SELECT * WHERE { ?s ?p ?o }", "tabular");
        let b = CacheKey::for_query("SELECT * WHERE { ?s ?p ?o }", "tabular");
        let c = CacheKey::for_query("SELECT * WHERE { ?s ?p ?o }", "simplified");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_normalizes_whitespace() {
        let a = CacheKey::for_query("SELECT *\n  WHERE { ?s ?p ?o }", "raw");
        let b = CacheKey::for_query("SELECT * WHERE { ?s ?p ?o }", "raw");
        assert_eq!(a, b);
    }

    #[test]
    fn get_records_hits_and_misses() {
        let cache = cache(CacheStrategy::Lru, 4, 0);
        let key = CacheKey::for_query("q", "raw");

        assert!(cache.get(key).is_none());
        cache.put(key, json!({"x": 1}));
        assert_eq!(cache.get(key), Some(json!({"x": 1})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.current_size, 1);
    }

    #[test]
    fn expired_entry_is_a_miss_not_an_eviction() {
        let cache = cache(CacheStrategy::Lru, 4, 60);
        let key = CacheKey::for_query("q", "raw");
        let t0 = Utc::now();

        cache.put_at(key, json!(1), t0);
        assert_eq!(cache.get_at(key, t0 + Duration::seconds(59)), Some(json!(1)));
        assert!(cache.get_at(key, t0 + Duration::seconds(61)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.current_size, 0, "expired entry purged on read");
    }

    #[test]
    fn entry_absent_exactly_at_ttl_boundary() {
        let cache = cache(CacheStrategy::Fifo, 4, 30);
        let key = CacheKey::for_query("q", "raw");
        let t0 = Utc::now();

        cache.put_at(key, json!(1), t0);
        assert!(cache.get_at(key, t0 + Duration::seconds(30)).is_none());
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let cache = cache(CacheStrategy::Lru, 4, 0);
        let key = CacheKey::for_query("q", "raw");
        let t0 = Utc::now();

        cache.put_at(key, json!(1), t0);
        assert_eq!(
            cache.get_at(key, t0 + Duration::days(365)),
            Some(json!(1))
        );
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = cache(CacheStrategy::Fifo, 2, 0);
        for i in 0..10u64 {
            cache.put(CacheKey::from_raw(i), json!(i));
            assert!(cache.len() <= 2);
        }
        assert_eq!(cache.stats().evictions, 8);
    }

    #[test]
    fn lru_eviction_sequence_from_spec() {
        // max_size=2: insert A, B, access A, insert C => B is evicted.
        let cache = cache(CacheStrategy::Lru, 2, 0);
        let a = CacheKey::for_query("A", "raw");
        let b = CacheKey::for_query("B", "raw");
        let c = CacheKey::for_query("C", "raw");

        cache.put(a, json!("a"));
        cache.put(b, json!("b"));
        assert!(cache.get(a).is_some());
        cache.put(c, json!("c"));

        assert!(cache.get(b).is_none(), "B was least recently used");
        assert!(cache.get(a).is_some());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn overwrite_does_not_evict_or_grow() {
        let cache = cache(CacheStrategy::Lru, 2, 0);
        let key = CacheKey::from_raw(7);
        cache.put(key, json!(1));
        cache.put(key, json!(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(key), Some(json!(2)));
    }

    #[test]
    fn overwrite_resets_entry_lifetime() {
        let cache = cache(CacheStrategy::Lru, 2, 60);
        let key = CacheKey::from_raw(7);
        let t0 = Utc::now();

        cache.put_at(key, json!(1), t0);
        cache.put_at(key, json!(2), t0 + Duration::seconds(50));
        // 70s after the original insert, but only 20s after the overwrite.
        assert_eq!(
            cache.get_at(key, t0 + Duration::seconds(70)),
            Some(json!(2))
        );
    }

    #[test]
    fn clear_resets_counters_and_is_idempotent() {
        let cache = cache(CacheStrategy::Lfu, 4, 0);
        let key = CacheKey::from_raw(1);
        cache.put(key, json!(1));
        cache.get(key);
        cache.get(CacheKey::from_raw(2));

        cache.clear();
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.max_size, 4, "configuration survives clear");
        assert_eq!(stats.strategy, "lfu");
    }

    #[test]
    fn zero_capacity_put_is_a_no_op() {
        let cache = QueryCache::new(CacheConfig {
            enabled: false,
            max_size: 0,
            ttl_secs: 0,
            strategy: CacheStrategy::Lru,
        })
        .expect("disabled cache config is valid");

        cache.put(CacheKey::from_raw(1), json!(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let negative_ttl = QueryCache::new(CacheConfig {
            ttl_secs: -1,
            ..CacheConfig::default()
        });
        assert!(negative_ttl.is_err());

        let zero_capacity = QueryCache::new(CacheConfig {
            max_size: 0,
            ..CacheConfig::default()
        });
        assert!(zero_capacity.is_err());
    }
}
