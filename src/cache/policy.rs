// =============================================================================
// Cache Eviction Policies
// =============================================================================
// Pluggable replacement strategies for the query result cache. Each policy
// keeps its own bookkeeping keyed by cache key; the cache owns the policy and
// is the only caller.

use super::CacheKey;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::Display;

/// Replacement strategy selector, as accepted on the CLI and in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheStrategy {
    Lru,
    Lfu,
    Fifo,
}

impl CacheStrategy {
    /// Construct the policy implementation for this strategy.
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            CacheStrategy::Lru => Box::new(LruPolicy::default()),
            CacheStrategy::Lfu => Box::new(LfuPolicy::default()),
            CacheStrategy::Fifo => Box::new(FifoPolicy::default()),
        }
    }
}

/// Decides which entry to drop when the cache is at capacity.
///
/// The cache notifies the policy of every access, insert, and removal so the
/// policy's view of the key set always matches the cache contents.
/// `select_victim` must only be called while at least one key is tracked.
pub trait EvictionPolicy: Send {
    /// A key was read on a cache hit.
    fn on_access(&mut self, key: CacheKey);
    /// A key was inserted (or overwritten, which counts as a fresh insert).
    fn on_insert(&mut self, key: CacheKey);
    /// A key was removed by eviction, expiry, or clear.
    fn on_remove(&mut self, key: CacheKey);
    /// The key that should be evicted next.
    fn select_victim(&self) -> Option<CacheKey>;
    /// Strategy name reported in statistics.
    fn name(&self) -> &'static str;
}

/// Least-recently-used. Victim is the key with the stalest access, with
/// insertion order breaking ties between equally stale keys.
#[derive(Debug, Default)]
pub struct LruPolicy {
    tick: u64,
    entries: HashMap<CacheKey, LruState>,
}

#[derive(Debug, Clone, Copy)]
struct LruState {
    last_access: u64,
    inserted: u64,
}

impl EvictionPolicy for LruPolicy {
    fn on_access(&mut self, key: CacheKey) {
        self.tick += 1;
        if let Some(state) = self.entries.get_mut(&key) {
            state.last_access = self.tick;
        }
    }

    fn on_insert(&mut self, key: CacheKey) {
        self.tick += 1;
        self.entries.insert(
            key,
            LruState {
                last_access: self.tick,
                inserted: self.tick,
            },
        );
    }

    fn on_remove(&mut self, key: CacheKey) {
        self.entries.remove(&key);
    }

    fn select_victim(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, state)| (state.last_access, state.inserted))
            .map(|(key, _)| *key)
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}

/// Least-frequently-used. Victim is the key with the lowest access count;
/// the least-recently-used of equally cold keys loses. A fresh insert starts
/// at frequency 1: the miss that created the entry counts as its first use.
#[derive(Debug, Default)]
pub struct LfuPolicy {
    tick: u64,
    entries: HashMap<CacheKey, LfuState>,
}

#[derive(Debug, Clone, Copy)]
struct LfuState {
    frequency: u64,
    last_access: u64,
}

impl EvictionPolicy for LfuPolicy {
    fn on_access(&mut self, key: CacheKey) {
        self.tick += 1;
        if let Some(state) = self.entries.get_mut(&key) {
            state.frequency += 1;
            state.last_access = self.tick;
        }
    }

    fn on_insert(&mut self, key: CacheKey) {
        self.tick += 1;
        self.entries.insert(
            key,
            LfuState {
                frequency: 1,
                last_access: self.tick,
            },
        );
    }

    fn on_remove(&mut self, key: CacheKey) {
        self.entries.remove(&key);
    }

    fn select_victim(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, state)| (state.frequency, state.last_access))
            .map(|(key, _)| *key)
    }

    fn name(&self) -> &'static str {
        "lfu"
    }
}

/// First-in-first-out. Victim is the earliest-inserted key regardless of
/// access history; accesses are deliberately ignored.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    tick: u64,
    entries: HashMap<CacheKey, u64>,
}

impl EvictionPolicy for FifoPolicy {
    fn on_access(&mut self, _key: CacheKey) {}

    fn on_insert(&mut self, key: CacheKey) {
        self.tick += 1;
        self.entries.insert(key, self.tick);
    }

    fn on_remove(&mut self, key: CacheKey) {
        self.entries.remove(&key);
    }

    fn select_victim(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, inserted)| **inserted)
            .map(|(key, _)| *key)
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}
