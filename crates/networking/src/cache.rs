use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Location;
use crate::mime::MimeType;

/// Configuration for the response cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of entries kept after a trim
    pub cache_limit: usize,
    /// Slack above `cache_limit` before a trim happens
    pub cache_threshold: usize,
    /// Lifetime of an entry in minutes
    pub cache_life_minutes: i64,
    /// Entries never expire by age
    pub cache_unlimited_life: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_limit: 1000,
            cache_threshold: 125,
            cache_life_minutes: 15,
            cache_unlimited_life: true,
        }
    }
}

/// A cached document
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Location the body was fetched from
    pub key: Location,
    pub body: Bytes,
    pub mime: MimeType,
    pub inserted_at: DateTime<Utc>,
    /// Vertical scroll offset the reader left the page at
    pub scroll_position: Option<i32>,
}

impl CacheEntry {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.inserted_at
    }
}

/// Bounded in-memory store of fetched documents keyed by fragment-free location.
///
/// Eviction is oldest-inserted first. Updating the scroll position of an
/// entry through [`ResponseCache::find`] does not change its age.
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    /// Keys from oldest to newest insertion
    order: VecDeque<String>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CacheConfig) {
        self.config = config;
        self.trim();
    }

    /// Insert or replace the entry for `key`, stamped with the current time
    pub fn push(&mut self, key: &Location, body: Bytes, mime: MimeType) {
        self.push_at(key, body, mime, Utc::now());
    }

    pub fn push_at(&mut self, key: &Location, body: Bytes, mime: MimeType, now: DateTime<Utc>) {
        let cache_key = key.cache_key().to_string();

        if self.entries.remove(&cache_key).is_some() {
            self.order.retain(|k| k != &cache_key);
        }

        log::debug!("Caching {} ({} bytes, {})", cache_key, body.len(), mime);
        self.entries.insert(
            cache_key.clone(),
            CacheEntry {
                key: key.without_fragment(),
                body,
                mime,
                inserted_at: now,
                scroll_position: None,
            },
        );
        self.order.push_back(cache_key);

        if self.entries.len() > self.config.cache_limit + self.config.cache_threshold {
            self.trim();
        }
    }

    /// Look up an entry for in-place update. Callers are expected to run
    /// [`ResponseCache::clean`] first when expiry matters.
    pub fn find(&mut self, key: &Location) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key.cache_key())
    }

    pub fn get(&self, key: &Location) -> Option<&CacheEntry> {
        self.entries.get(key.cache_key())
    }

    pub fn contains(&self, key: &Location) -> bool {
        self.entries.contains_key(key.cache_key())
    }

    /// Drop entries older than the configured lifetime
    pub fn clean(&mut self) {
        self.clean_at(Utc::now());
    }

    pub fn clean_at(&mut self, now: DateTime<Utc>) {
        if self.config.cache_unlimited_life {
            return;
        }

        let life = Duration::minutes(self.config.cache_life_minutes);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.age_at(now) <= life);
        if self.entries.len() != before {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
            log::debug!("Expired {} cache entries", before - self.entries.len());
        }
    }

    /// Evict oldest entries until at most `cache_limit` remain
    fn trim(&mut self) {
        let mut evicted = 0;
        while self.entries.len() > self.config.cache_limit {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            log::debug!("Evicted {} cache entries", evicted);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            total_size_bytes: self.entries.values().map(|e| e.body.len()).sum(),
            cache_limit: self.config.cache_limit,
            cache_threshold: self.config.cache_threshold,
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in the cache
    pub entry_count: usize,
    /// Total size of cached bodies in bytes
    pub total_size_bytes: usize,
    pub cache_limit: usize,
    pub cache_threshold: usize,
}

impl CacheStats {
    /// Entry count as a percentage of the limit
    pub fn entry_utilization(&self) -> f64 {
        if self.cache_limit == 0 {
            0.0
        } else {
            (self.entry_count as f64 / self.cache_limit as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(n: usize) -> Location {
        Location::parse(&format!("gemini://example.org/{}", n)).unwrap()
    }

    fn gemtext() -> MimeType {
        MimeType::parse("text/gemini; charset=utf-8").unwrap()
    }

    fn limited(limit: usize, threshold: usize) -> ResponseCache {
        ResponseCache::new(CacheConfig {
            cache_limit: limit,
            cache_threshold: threshold,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn test_push_and_find() {
        let mut cache = ResponseCache::default();
        let url = Location::parse("gemini://example.org/page").unwrap();
        cache.push(&url, Bytes::from_static(b"# Hello\r\n"), gemtext());

        let entry = cache.find(&url).unwrap();
        assert_eq!(&entry.body[..], b"# Hello\r\n");
        assert_eq!(entry.mime, gemtext());
        assert_eq!(entry.scroll_position, None);
    }

    #[test]
    fn test_lookup_ignores_fragment() {
        let mut cache = ResponseCache::default();
        let url = Location::parse("gemini://example.org/page#intro").unwrap();
        cache.push(&url, Bytes::from_static(b"x"), gemtext());

        let plain = Location::parse("gemini://example.org/page").unwrap();
        assert!(cache.contains(&plain));
        assert_eq!(cache.get(&plain).unwrap().key, plain);
    }

    #[test]
    fn test_expiry() {
        let mut cache = ResponseCache::new(CacheConfig {
            cache_life_minutes: 15,
            cache_unlimited_life: false,
            ..CacheConfig::default()
        });
        let url = location(1);
        let start = Utc::now();
        cache.push_at(&url, Bytes::from_static(b"x"), gemtext(), start);

        cache.clean_at(start + Duration::minutes(10));
        assert!(cache.find(&url).is_some());

        cache.clean_at(start + Duration::minutes(16));
        assert!(cache.find(&url).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unlimited_life_never_expires() {
        let mut cache = ResponseCache::default();
        let url = location(1);
        let start = Utc::now();
        cache.push_at(&url, Bytes::from_static(b"x"), gemtext(), start);

        cache.clean_at(start + Duration::days(365));
        assert!(cache.find(&url).is_some());
    }

    #[test]
    fn test_batched_eviction() {
        let mut cache = limited(10, 5);

        for n in 0..15 {
            cache.push(&location(n), Bytes::from_static(b"x"), gemtext());
        }
        // Threshold is slack: nothing evicted yet
        assert_eq!(cache.len(), 15);

        cache.push(&location(15), Bytes::from_static(b"x"), gemtext());
        assert_eq!(cache.len(), 10);

        for n in 0..6 {
            assert!(!cache.contains(&location(n)), "entry {} should be evicted", n);
        }
        for n in 6..16 {
            assert!(cache.contains(&location(n)), "entry {} should be kept", n);
        }
    }

    #[test]
    fn test_replace_resets_age() {
        let mut cache = limited(2, 0);
        cache.push(&location(1), Bytes::from_static(b"old"), gemtext());
        cache.push(&location(2), Bytes::from_static(b"x"), gemtext());
        cache.push(&location(1), Bytes::from_static(b"new"), gemtext());
        cache.push(&location(3), Bytes::from_static(b"x"), gemtext());

        assert!(!cache.contains(&location(2)));
        assert_eq!(&cache.get(&location(1)).unwrap().body[..], b"new");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_scroll_update_keeps_order() {
        let mut cache = limited(2, 0);
        cache.push(&location(1), Bytes::from_static(b"x"), gemtext());
        cache.push(&location(2), Bytes::from_static(b"x"), gemtext());

        cache.find(&location(1)).unwrap().scroll_position = Some(420);
        cache.push(&location(3), Bytes::from_static(b"x"), gemtext());

        // Entry 1 is still the oldest even though it was touched last
        assert!(!cache.contains(&location(1)));
        assert!(cache.contains(&location(2)));
    }

    #[test]
    fn test_stats_and_clear() {
        let mut cache = ResponseCache::default();
        cache.push(&location(1), Bytes::from_static(b"1234"), gemtext());
        cache.push(&location(2), Bytes::from_static(b"56"), gemtext());

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size_bytes, 6);

        cache.clear();
        assert_eq!(cache.stats().entry_count, 0);
    }
}
