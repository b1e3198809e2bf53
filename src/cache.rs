//! Small in-process TTL cache for read-heavy endpoints (store list,
//! approval stats). The database stays authoritative; entries are evicted on
//! expiry or explicit invalidation after a mutation.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const MAX_CACHE_ENTRIES: usize = 256;

static CACHE: OnceLock<DashMap<String, CacheEntry>> = OnceLock::new();

struct CacheEntry {
    data: String,
    expires_at: Instant,
}

fn get_cache() -> &'static DashMap<String, CacheEntry> {
    CACHE.get_or_init(DashMap::new)
}

pub fn get<T: for<'de> serde::Deserialize<'de>>(key: &str) -> Option<T> {
    let cache = get_cache();

    if let Some(entry) = cache.get(key) {
        if Instant::now() < entry.expires_at {
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

pub fn set<T: Serialize>(key: &str, data: &T, ttl: Duration) {
    let cache = get_cache();

    if cache.len() >= MAX_CACHE_ENTRIES {
        let now = Instant::now();
        cache.retain(|_, entry| now < entry.expires_at);
    }

    let json_data = match serde_json::to_string(data) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Cache serialization failed for {}: {}", key, e);
            return;
        }
    };

    cache.insert(
        key.to_string(),
        CacheEntry {
            data: json_data,
            expires_at: Instant::now() + ttl,
        },
    );
}

/// Drop a key after the underlying data changed.
pub fn invalidate(key: &str) {
    get_cache().remove(key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_invalidate_round_trip() {
        let key = "test:roundtrip";
        set(key, &vec![1, 2, 3], Duration::from_secs(60));
        assert_eq!(get::<Vec<i32>>(key), Some(vec![1, 2, 3]));
        invalidate(key);
        assert_eq!(get::<Vec<i32>>(key), None);
    }

    #[test]
    fn expired_entries_are_not_served() {
        let key = "test:expired";
        set(key, &"stale", Duration::from_secs(0));
        assert_eq!(get::<String>(key), None);
    }
}
