//! Process-wide cache of upstream payloads keyed by normalized URL.
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use moka::sync::Cache;
use serde_json::Value as JsonValue;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// TTL cache of raw provider payloads.
///
/// Entries expire a fixed time after insertion and are also evicted once the
/// capacity is reached. Concurrent writers to one key are fine: the last write wins.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<String, Arc<JsonValue>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        ResponseCache { cache }
    }

    pub fn get(&self, key: &str) -> Option<Arc<JsonValue>> {
        let hit = self.cache.get(key);
        let metric_def = if hit.is_some() { CACHE_HIT } else { CACHE_MISS };
        counter!(metric_def).increment(1);
        hit
    }

    pub fn set(&self, key: String, value: Arc<JsonValue>) {
        self.cache.insert(key, value);
    }
}

/// Normalizes a URL into a cache key: fragment dropped, query pairs sorted.
///
/// Scheme and host casing and default ports are already normalized by `Url`.
pub fn cache_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        pairs.sort();
        normalized.query_pairs_mut().clear().extend_pairs(pairs);
    }

    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_normalization() {
        let a = Url::parse("HTTP://Example.com:80/search?b=2&a=1#top").unwrap();
        let b = Url::parse("http://example.com/search?a=1&b=2").unwrap();
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&b), "http://example.com/search?a=1&b=2");

        let c = Url::parse("http://example.com/search?a=1&b=3").unwrap();
        assert_ne!(cache_key(&b), cache_key(&c));

        let bare = Url::parse("http://example.com/summary/Paris?").unwrap();
        assert_eq!(cache_key(&bare), "http://example.com/summary/Paris");
    }

    #[test]
    fn test_get_set() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        assert!(cache.get("k").is_none());

        cache.set("k".into(), Arc::new(json!({"temp": 21})));
        assert_eq!(cache.get("k").as_deref(), Some(&json!({"temp": 21})));

        // Last write wins
        cache.set("k".into(), Arc::new(json!({"temp": 22})));
        assert_eq!(cache.get("k").as_deref(), Some(&json!({"temp": 22})));
    }

    #[test]
    fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_millis(100), 10);
        cache.set("k".into(), Arc::new(json!(1)));
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(200));
        assert!(cache.get("k").is_none());
    }
}
