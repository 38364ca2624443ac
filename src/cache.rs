//! Small in-process response cache with TTL and explicit invalidation keys.
//! Used for the admin dashboard aggregates; mutating admin operations call
//! `invalidate` so the next read recomputes.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Maximum number of cache entries before eviction kicks in
const MAX_CACHE_ENTRIES: usize = 256;

static CACHE: OnceLock<DashMap<String, CacheEntry>> = OnceLock::new();

#[derive(Clone)]
struct CacheEntry {
    data: String,
    expires_at: Instant,
    last_accessed: Instant,
}

fn get_cache() -> &'static DashMap<String, CacheEntry> {
    CACHE.get_or_init(DashMap::new)
}

/// Get cached data if it exists and hasn't expired
pub fn get<T: for<'de> serde::Deserialize<'de>>(key: &str) -> Option<T> {
    let cache = get_cache();

    if let Some(mut entry) = cache.get_mut(key) {
        if Instant::now() < entry.expires_at {
            entry.last_accessed = Instant::now();

            if let Ok(data) = serde_json::from_str(&entry.data) {
                return Some(data);
            }
        } else {
            drop(entry);
            cache.remove(key);
        }
    }

    None
}

/// Set cached data with TTL (time to live)
pub fn set<T: Serialize>(key: &str, data: &T, ttl: Duration) -> Result<(), serde_json::Error> {
    let cache = get_cache();

    if cache.len() >= MAX_CACHE_ENTRIES {
        evict_lru_entries();
    }

    let json_data = serde_json::to_string(data)?;
    let now = Instant::now();

    cache.insert(
        key.to_string(),
        CacheEntry {
            data: json_data,
            expires_at: now + ttl,
            last_accessed: now,
        },
    );
    Ok(())
}

/// Drop a key so the next read recomputes (used after admin mutations).
pub fn invalidate(key: &str) {
    get_cache().remove(key);
}

/// Evict the oldest 20% of entries by last access time.
fn evict_lru_entries() {
    let cache = get_cache();
    let current_size = cache.len();
    let target_remove = current_size / 5;

    if target_remove == 0 {
        return;
    }

    let mut entries: Vec<(String, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().last_accessed))
        .collect();

    entries.sort_by_key(|(_, last_accessed)| *last_accessed);

    for (key, _) in entries.iter().take(target_remove) {
        cache.remove(key);
    }

    tracing::info!(
        "Cache eviction: removed {} LRU entries (cache size: {} -> {})",
        target_remove,
        current_size,
        cache.len()
    );
}
