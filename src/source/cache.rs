//! Output cache for chaining tool calls

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A cached file together with what a later call needs to reuse it
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl CachedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

struct CacheInner {
    lru: LruCache<String, CachedFile>,
    total_bytes: usize,
}

/// LRU cache bounded by entry count and total payload bytes
pub struct CacheManager {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl CacheManager {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store `file` under `key`, evicting least recently used entries until it fits.
    ///
    /// Returns false, storing nothing, when the file alone exceeds the byte budget.
    pub fn put(&self, key: String, file: CachedFile) -> bool {
        let size = file.data.len();
        if size > self.max_bytes {
            tracing::debug!(key = %key, size, budget = self.max_bytes, "file too large to cache");
            return false;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.data.len());
        }
        while inner.total_bytes + size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }
        // Entry-count eviction happens inside `push`
        if let Some((evicted_key, evicted)) = inner.lru.push(key.clone(), file) {
            if evicted_key != key {
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted.data.len());
            }
        }
        inner.total_bytes += size;
        true
    }

    /// Store `file` under a fresh key. `None` when the file was too large to keep.
    pub fn insert(&self, file: CachedFile) -> Option<String> {
        let key = self.generate_unique_key();
        self.put(key.clone(), file).then_some(key)
    }

    pub fn get(&self, key: &str) -> Option<CachedFile> {
        self.inner.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<CachedFile> {
        let mut inner = self.inner.lock();
        let file = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(file.data.len());
        Some(file)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// New UUID key not currently in use
    pub fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}
