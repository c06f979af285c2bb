use crate::music::resolver::ResolvedStream;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CachedStream {
    stream: ResolvedStream,
    expires_at: Instant,
}

/// Resolved stream addresses keyed by external track id, each valid for a fixed period.
#[derive(Clone)]
pub struct StreamCache {
    cache: Arc<Mutex<LruCache<String, CachedStream>>>,
    ttl: Duration,
}

impl StreamCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
            ttl,
        }
    }

    pub fn insert(&self, track_id: &str, stream: ResolvedStream) {
        let expires_at = Instant::now() + self.ttl;
        self.lock()
            .put(track_id.to_string(), CachedStream { stream, expires_at });
    }

    /// Returns the cached stream, evicting it instead when it has expired.
    pub fn get(&self, track_id: &str) -> Option<ResolvedStream> {
        let mut cache = self.lock();
        let expired = match cache.get(track_id) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.stream.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(track_id);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedStream>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::resolver::StreamSource;

    fn stream(title: &str) -> ResolvedStream {
        ResolvedStream {
            title: title.to_string(),
            source: StreamSource::Remote(format!("https://cdn.example/{}", title)),
            duration: None,
            resolved_by: "test",
        }
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let cache = StreamCache::new(4, Duration::from_secs(3600));
        cache.insert("abc", stream("first"));

        let hit = cache.get("abc").expect("fresh entry should be served");
        assert_eq!(hit.title, "first");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = StreamCache::new(4, Duration::ZERO);
        cache.insert("abc", stream("stale"));
        assert_eq!(cache.len(), 1);

        assert!(cache.get("abc").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_lru_capacity() {
        let cache = StreamCache::new(2, Duration::from_secs(3600));
        cache.insert("1", stream("one"));
        cache.insert("2", stream("two"));

        // Touch 1 so 2 becomes least recently used
        assert!(cache.get("1").is_some());
        cache.insert("3", stream("three"));

        assert!(cache.get("1").is_some());
        assert!(cache.get("2").is_none());
        assert!(cache.get("3").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_refreshes_entry() {
        let cache = StreamCache::new(2, Duration::from_secs(3600));
        cache.insert("abc", stream("old"));
        cache.insert("abc", stream("new"));
        assert_eq!(cache.get("abc").unwrap().title, "new");
        assert_eq!(cache.len(), 1);
    }
}
