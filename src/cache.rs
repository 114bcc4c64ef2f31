// Content-addressed caches
//
// *Le Cache* (The Cache) - Bounded LRU caches keyed by blake3 digests

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Cache key: blake3 digest of the cached input.
pub type CacheKey = blake3::Hash;

/// Hash a sequence of byte slices into a cache key.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn cache_key(parts: &[&[u8]]) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize()
}

/// A cache a cleanup strategy can flush without knowing its value type.
pub trait FlushableCache: Send + Sync {
    /// Human-readable cache name
    fn name(&self) -> &str;

    /// Approximate bytes held by cached values
    fn approx_bytes(&self) -> u64;

    /// Number of cached entries
    fn entry_count(&self) -> usize;

    /// Drop every entry, returning `(entries, bytes)` released
    fn flush(&self) -> (usize, u64);
}

struct Inner<V> {
    entries: LruCache<CacheKey, (V, u64)>,
    bytes: u64,
}

/// Bounded LRU cache with byte accounting.
pub struct ContentCache<V> {
    name: String,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ContentCache<V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                bytes: 0,
            }),
        }
    }

    /// Look up a value, refreshing its recency
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .map(|(value, _)| value.clone())
    }

    /// Whether a key is cached, without refreshing recency
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains(key)
    }

    /// Insert a value with its approximate size in bytes
    pub fn put(&self, key: CacheKey, value: V, weight: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, old_weight)) = inner.entries.pop(&key) {
            inner.bytes = inner.bytes.saturating_sub(old_weight);
        }
        if let Some((_, (_, evicted_weight))) = inner.entries.push(key, (value, weight)) {
            inner.bytes = inner.bytes.saturating_sub(evicted_weight);
        }
        inner.bytes = inner.bytes.saturating_add(weight);
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .cap()
            .get()
    }
}

impl<V: Clone + Send> FlushableCache for ContentCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn approx_bytes(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).bytes
    }

    fn entry_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn flush(&self) -> (usize, u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let released = (inner.entries.len(), inner.bytes);
        inner.entries.clear();
        inner.bytes = 0;
        released
    }
}

impl<V> std::fmt::Debug for ContentCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
