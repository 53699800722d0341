//! LRU cache of compiled matchers
use crate::error::Result;
use crate::search::matcher::{compile, Matcher};
use crate::search::SearchOptions;
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache key: everything that changes how a find string compiles. Scope and
/// wrap-around only affect scanning, so they are left out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pattern: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
    pub escapes_enabled: bool,
}

impl CacheKey {
    pub fn new(pattern: &str, options: &SearchOptions) -> Self {
        Self {
            pattern: pattern.to_string(),
            case_sensitive: options.case_sensitive,
            whole_word: options.whole_word,
            regex: options.regex,
            escapes_enabled: options.escapes_enabled,
        }
    }
}

/// Compiled matcher cache, shareable between finders.
pub struct MatcherCache {
    matchers: Mutex<LruCache<CacheKey, Arc<Matcher>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MatcherCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            matchers: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached matcher for `(pattern, options)` or compile and
    /// cache it. Compilation errors are returned and never cached.
    pub fn get_or_compile(&self, pattern: &str, options: &SearchOptions) -> Result<Arc<Matcher>> {
        let key = CacheKey::new(pattern, options);

        if let Some(matcher) = self.matchers.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Matcher cache hit for {pattern:?}");
            return Ok(Arc::clone(matcher));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let matcher = Arc::new(compile(pattern, options)?);
        self.matchers.lock().put(key, Arc::clone(&matcher));
        Ok(matcher)
    }

    pub fn invalidate(&self, pattern: &str, options: &SearchOptions) {
        self.matchers.lock().pop(&CacheKey::new(pattern, options));
    }

    pub fn clear(&self) {
        self.matchers.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.matchers.lock().len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for MatcherCache {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}
