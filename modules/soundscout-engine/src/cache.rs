//! TTL + LRU response cache.
//!
//! Keyed by `(operation, canonicalized params)`. Consulted before the quota
//! limiter everywhere — a cache hit never consumes budget.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 1024;

/// Per-operation TTLs. Unlisted operations use the default of one hour.
fn ttl_for(op: &str) -> Duration {
    match op {
        "spotify.search" => Duration::hours(24),
        "spotify.artist" => Duration::hours(6),
        "instagram.profile" => Duration::hours(1),
        _ if op.starts_with("fetch.") => Duration::minutes(15),
        _ => Duration::hours(1),
    }
}

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<String, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

pub struct ResponseCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Canonical cache key: params sorted by name so call-site ordering never
    /// splits the cache.
    pub fn key(op: &str, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort();
        let joined: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{op}:{}", joined.join("&"))
    }

    pub fn get(&self, op: &str, params: &[(&str, &str)]) -> Option<String> {
        self.get_at(op, params, Utc::now())
    }

    fn get_at(&self, op: &str, params: &[(&str, &str)], now: DateTime<Utc>) -> Option<String> {
        let key = Self::key(op, params);
        let mut guard = self.state.lock().expect("cache mutex poisoned");
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;
        match state.entries.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_used = tick;
                state.hits += 1;
                debug!(key, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                state.entries.remove(&key);
                state.misses += 1;
                None
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, op: &str, params: &[(&str, &str)], value: String) {
        self.put_at(op, params, value, Utc::now())
    }

    fn put_at(&self, op: &str, params: &[(&str, &str)], value: String, now: DateTime<Utc>) {
        let key = Self::key(op, params);
        let mut guard = self.state.lock().expect("cache mutex poisoned");
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;

        if state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
            // Drop expired entries first, then the least-recently-used one.
            state.entries.retain(|_, e| e.expires_at > now);
            if state.entries.len() >= self.capacity {
                if let Some(lru_key) = state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone())
                {
                    state.entries.remove(&lru_key);
                }
            }
        }

        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl_for(op),
                last_used: tick,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().expect("cache mutex poisoned");
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
