// =============================================================================
// Query Cache Tests
// =============================================================================
// Capacity bounds, TTL expiry, per-policy eviction order, and statistics.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;
use sparql_mcp::cache::{CacheConfig, CacheKey, CacheStrategy, QueryCache};

fn cache_with(strategy: CacheStrategy, max_size: usize, ttl_secs: i64) -> QueryCache {
    QueryCache::new(CacheConfig {
        enabled: true,
        max_size,
        ttl_secs,
        strategy,
    })
    .expect("valid cache config")
}

fn key(name: &str) -> CacheKey {
    CacheKey::for_query(name, "raw")
}

// =============================================================================
// Eviction Determinism
// =============================================================================

#[test]
fn lru_evicts_least_recently_used() {
    let cache = cache_with(CacheStrategy::Lru, 2, 0);
    cache.put(key("A"), json!("a"));
    cache.put(key("B"), json!("b"));
    assert!(cache.get(key("A")).is_some());
    cache.put(key("C"), json!("c"));

    assert!(cache.get(key("B")).is_none());
    assert!(cache.get(key("A")).is_some());
    assert!(cache.get(key("C")).is_some());
}

#[test]
fn lru_tie_breaks_by_insertion_order() {
    let cache = cache_with(CacheStrategy::Lru, 2, 0);
    cache.put(key("A"), json!("a"));
    cache.put(key("B"), json!("b"));
    // Neither entry re-accessed: A is the earliest-inserted of equally
    // stale entries and must lose.
    cache.put(key("C"), json!("c"));

    assert!(cache.get(key("A")).is_none());
    assert!(cache.get(key("B")).is_some());
}

#[test]
fn lfu_evicts_least_frequently_used() {
    let cache = cache_with(CacheStrategy::Lfu, 2, 0);
    cache.put(key("A"), json!("a"));
    cache.put(key("B"), json!("b"));
    cache.get(key("A"));
    cache.get(key("A"));
    cache.get(key("B"));
    // A: freq 3, B: freq 2. The new insert evicts B.
    cache.put(key("C"), json!("c"));

    assert!(cache.get(key("B")).is_none());
    assert!(cache.get(key("A")).is_some());
}

#[test]
fn lfu_tie_breaks_by_recency() {
    let cache = cache_with(CacheStrategy::Lfu, 2, 0);
    cache.put(key("A"), json!("a"));
    cache.put(key("B"), json!("b"));
    cache.get(key("A"));
    cache.get(key("B"));
    // Both at frequency 2; A is least recently used among them.
    cache.put(key("C"), json!("c"));

    assert!(cache.get(key("A")).is_none());
    assert!(cache.get(key("B")).is_some());
}

#[test]
fn fifo_evicts_oldest_insert_despite_access() {
    let cache = cache_with(CacheStrategy::Fifo, 2, 0);
    cache.put(key("A"), json!("a"));
    cache.put(key("B"), json!("b"));
    cache.get(key("A"));
    cache.get(key("A"));
    cache.put(key("C"), json!("c"));

    assert!(cache.get(key("A")).is_none(), "FIFO ignores access history");
    assert!(cache.get(key("B")).is_some());
}

// =============================================================================
// TTL Expiry
// =============================================================================

#[test]
fn entry_lives_until_ttl_and_not_beyond() {
    let cache = cache_with(CacheStrategy::Lru, 4, 120);
    let k = key("q");
    let t0 = Utc::now();

    cache.put_at(k, json!(1), t0);
    assert!(cache.get_at(k, t0 + Duration::seconds(119)).is_some());
    assert!(cache.get_at(k, t0 + Duration::seconds(120)).is_none());
}

#[test]
fn expiry_counts_as_miss_and_purges_lazily() {
    let cache = cache_with(CacheStrategy::Lru, 4, 10);
    let k = key("q");
    let t0 = Utc::now();
    cache.put_at(k, json!(1), t0);

    // Still resident before any read touches it.
    assert_eq!(cache.stats().current_size, 1);

    assert!(cache.get_at(k, t0 + Duration::seconds(11)).is_none());
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.current_size, 0);
}

// =============================================================================
// Statistics and Clear
// =============================================================================

#[test]
fn stats_report_strategy_and_counters() {
    let cache = cache_with(CacheStrategy::Fifo, 3, 0);
    cache.put(key("A"), json!(1));
    cache.get(key("A"));
    cache.get(key("missing"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.current_size, 1);
    assert_eq!(stats.max_size, 3);
    assert_eq!(stats.strategy, "fifo");
}

#[test]
fn clear_twice_is_equivalent_to_once() {
    let cache = cache_with(CacheStrategy::Lru, 3, 0);
    cache.put(key("A"), json!(1));
    cache.put(key("B"), json!(2));
    cache.get(key("A"));

    cache.clear();
    let first = cache.stats();
    cache.clear();
    let second = cache.stats();

    assert_eq!(first, second);
    assert_eq!(second.current_size, 0);
    assert_eq!(second.hits, 0);
    assert_eq!(second.misses, 0);
}

#[test]
fn eviction_continues_correctly_after_clear() {
    let cache = cache_with(CacheStrategy::Lru, 2, 0);
    cache.put(key("A"), json!(1));
    cache.put(key("B"), json!(2));
    cache.clear();

    cache.put(key("C"), json!(3));
    cache.put(key("D"), json!(4));
    cache.put(key("E"), json!(5));

    assert!(cache.get(key("C")).is_none());
    assert!(cache.get(key("D")).is_some());
    assert!(cache.get(key("E")).is_some());
    assert_eq!(cache.stats().evictions, 1);
}

// =============================================================================
// Capacity Invariant
// =============================================================================

proptest! {
    #[test]
    fn size_never_exceeds_capacity(
        operations in prop::collection::vec((0u64..32, prop::bool::ANY), 1..200),
        strategy in prop_oneof![
            Just(CacheStrategy::Lru),
            Just(CacheStrategy::Lfu),
            Just(CacheStrategy::Fifo),
        ],
        max_size in 1usize..8,
    ) {
        let cache = cache_with(strategy, max_size, 0);
        for (raw_key, is_put) in operations {
            let k = CacheKey::from_raw(raw_key);
            if is_put {
                cache.put(k, json!(raw_key));
            } else {
                cache.get(k);
            }
            prop_assert!(cache.stats().current_size <= max_size);
        }
    }
}
