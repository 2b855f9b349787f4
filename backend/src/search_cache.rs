use std::{
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

use lru::LruCache;

use crate::models::Location;

struct CachedSearch {
    stored_at: Instant,
    locations: Vec<Location>,
}

/// LRU cache of geocoding results keyed by normalised query text.
///
/// Entries older than the TTL are treated as missing and evicted on lookup.
pub struct SearchCache {
    entries: Mutex<LruCache<String, CachedSearch>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn get(&self, query: &str) -> Option<Vec<Location>> {
        self.get_at(query, Instant::now())
    }

    pub fn insert(&self, query: &str, locations: Vec<Location>) {
        self.insert_at(query, locations, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, query: &str, now: Instant) -> Option<Vec<Location>> {
        let key = Self::key(query);
        let Ok(mut cache) = self.entries.lock() else {
            return None;
        };

        let fresh = cache
            .peek(&key)
            .map(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)?;
        if !fresh {
            cache.pop(&key);
            tracing::debug!("search cache entry expired for {key:?}");
            return None;
        }

        tracing::debug!("search cache hit for {key:?}");
        cache.get(&key).map(|entry| entry.locations.clone())
    }

    fn insert_at(&self, query: &str, locations: Vec<Location>, now: Instant) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.put(
                Self::key(query),
                CachedSearch {
                    stored_at: now,
                    locations,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_secs: u64) -> SearchCache {
        SearchCache::new(
            NonZeroUsize::new(capacity).unwrap(),
            Duration::from_secs(ttl_secs),
        )
    }

    fn dhaka() -> Vec<Location> {
        vec![Location {
            lat: 23.8103,
            lon: 90.4125,
            display_name: "Dhaka".into(),
            address: None,
        }]
    }

    #[test]
    fn normalises_query_keys() {
        let cache = cache(4, 60);
        cache.insert("  Dhaka ", dhaka());
        assert_eq!(cache.get("dhaka"), Some(dhaka()));
        assert_eq!(cache.get("DHAKA"), Some(dhaka()));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = cache(4, 300);
        let stored = Instant::now();
        cache.insert_at("dhaka", dhaka(), stored);

        assert!(cache.get_at("dhaka", stored + Duration::from_secs(299)).is_some());
        assert!(cache.get_at("dhaka", stored + Duration::from_secs(300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2, 60);
        cache.insert("a", dhaka());
        cache.insert("b", dhaka());
        assert!(cache.get("a").is_some());
        cache.insert("c", dhaka());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 2);
    }
}
