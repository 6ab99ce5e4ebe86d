//! Memoization for compiled regex/JSONPath artefacts, keyed by predicate
//! kind + pattern string (§4.1: "bounded, ≈256 entries, LRU").

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Regex(String),
    JsonPath(String),
}

#[derive(Clone)]
enum CachedArtifact {
    Regex(Arc<Regex>),
    /// jsonpath_lib's one-shot `select` re-parses the path on every call, so
    /// there is no compiled object to retain; caching the *validity* still
    /// saves re-raising the same parse error on every subsequent evaluation.
    JsonPath,
}

pub struct PatternCache {
    inner: Mutex<LruCache<CacheKey, CachedArtifact>>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PatternCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Get or compile a case-insensitive regex, capped at 1000 chars per
    /// §4.1. Returns `None` on overlong or invalid patterns; callers treat
    /// that as a non-matching predicate and log a warning.
    pub fn get_or_compile_regex(&self, pattern: &str) -> Option<Arc<Regex>> {
        if pattern.len() > 1000 {
            tracing::warn!(len = pattern.len(), "regex pattern exceeds 1000 chars, rejecting");
            return None;
        }
        let key = CacheKey::Regex(pattern.to_string());
        {
            let mut guard = self.inner.lock();
            if let Some(CachedArtifact::Regex(re)) = guard.get(&key) {
                return Some(re.clone());
            }
        }
        let compiled = match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Arc::new(re),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid regex pattern");
                return None;
            }
        };
        self.inner
            .lock()
            .put(key, CachedArtifact::Regex(compiled.clone()));
        Some(compiled)
    }

    /// Validate (without executing) that `pattern` compiles, and remember
    /// a clean bill of health for it.
    pub fn validate_jsonpath(&self, pattern: &str) -> bool {
        let key = CacheKey::JsonPath(pattern.to_string());
        {
            let guard = self.inner.lock();
            if guard.peek(&key).is_some() {
                return true;
            }
        }
        let probe = serde_json::json!({});
        match jsonpath_lib::select(&probe, pattern) {
            Ok(_) => {
                self.inner.lock().put(key, CachedArtifact::JsonPath);
                true
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid jsonpath pattern");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_memoizes_regex() {
        let cache = PatternCache::default();
        let a = cache.get_or_compile_regex("rm -rf").unwrap();
        let b = cache.get_or_compile_regex("rm -rf").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overlong_regex_is_rejected() {
        let cache = PatternCache::default();
        let pattern = "a".repeat(1001);
        assert!(cache.get_or_compile_regex(&pattern).is_none());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let cache = PatternCache::default();
        assert!(cache.get_or_compile_regex("[unterminated").is_none());
    }

    #[test]
    fn jsonpath_validation_is_memoized() {
        let cache = PatternCache::default();
        assert!(cache.validate_jsonpath("$.command"));
        assert!(cache.validate_jsonpath("$.command"));
        assert_eq!(cache.len(), 1);
    }
}
